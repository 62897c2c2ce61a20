//! Snapshot document store abstraction.
//!
//! Aggregates persist as whole-document snapshots keyed by shop and id,
//! matching a Firestore-like backend: last write wins, no partial updates.
//! The core consumes only this narrow read/write surface and stays ignorant
//! of query semantics, pagination, or caching policy.

mod in_memory;

pub use in_memory::InMemoryDocumentStore;

use thiserror::Error;

use khata_core::ShopId;
use khata_customers::{Customer, CustomerId};
use khata_invoicing::{Invoice, InvoiceId};

/// Failure while talking to the backing store.
///
/// Not retried here; callers may re-run the whole recompute-and-save cycle,
/// which is idempotent.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("failed to serialize document: {0}")]
    Serialization(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Shop-scoped reads and writes of customer and invoice snapshots.
pub trait DocumentStore: Send + Sync {
    fn get_customer(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, StoreError>;

    fn get_invoice(
        &self,
        shop_id: ShopId,
        invoice_id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError>;

    /// Lookup by the human-facing invoice number ("INV-2024-001").
    fn get_invoice_by_number(
        &self,
        shop_id: ShopId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, StoreError>;

    fn save_customer(&self, shop_id: ShopId, customer: &Customer) -> Result<(), StoreError>;

    fn save_invoice(&self, shop_id: ShopId, invoice: &Invoice) -> Result<(), StoreError>;
}

impl<S> DocumentStore for std::sync::Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn get_customer(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        (**self).get_customer(shop_id, customer_id)
    }

    fn get_invoice(
        &self,
        shop_id: ShopId,
        invoice_id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        (**self).get_invoice(shop_id, invoice_id)
    }

    fn get_invoice_by_number(
        &self,
        shop_id: ShopId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        (**self).get_invoice_by_number(shop_id, invoice_number)
    }

    fn save_customer(&self, shop_id: ShopId, customer: &Customer) -> Result<(), StoreError> {
        (**self).save_customer(shop_id, customer)
    }

    fn save_invoice(&self, shop_id: ShopId, invoice: &Invoice) -> Result<(), StoreError> {
        (**self).save_invoice(shop_id, invoice)
    }
}
