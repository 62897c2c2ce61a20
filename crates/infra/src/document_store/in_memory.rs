//! In-memory document store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use khata_core::ShopId;
use khata_customers::{Customer, CustomerId};
use khata_invoicing::{Invoice, InvoiceId};

use super::{DocumentStore, StoreError};

/// Shop-isolated in-memory snapshot store.
///
/// Last write wins, like the document database it stands in for. A
/// secondary index maps invoice numbers to ids for the by-number lookup.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    customers: RwLock<HashMap<(ShopId, CustomerId), Customer>>,
    invoices: RwLock<HashMap<(ShopId, InvoiceId), Invoice>>,
    invoice_numbers: RwLock<HashMap<(ShopId, String), InvoiceId>>,
    /// Test hooks for the partial-failure paths of the reconciler: when
    /// set, the matching writes fail with the stored backend message.
    fail_invoice_writes: RwLock<Option<String>>,
    fail_customer_writes: RwLock<Option<String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent invoice writes fail with the given backend message.
    pub fn fail_invoice_writes_with(&self, message: impl Into<String>) {
        if let Ok(mut flag) = self.fail_invoice_writes.write() {
            *flag = Some(message.into());
        }
    }

    /// Make subsequent customer writes fail with the given backend message.
    pub fn fail_customer_writes_with(&self, message: impl Into<String>) {
        if let Ok(mut flag) = self.fail_customer_writes.write() {
            *flag = Some(message.into());
        }
    }

    /// Let all writes succeed again.
    pub fn heal_writes(&self) {
        for flag in [&self.fail_invoice_writes, &self.fail_customer_writes] {
            if let Ok(mut flag) = flag.write() {
                *flag = None;
            }
        }
    }

    fn check_writable(flag: &RwLock<Option<String>>) -> Result<(), StoreError> {
        let flag = flag.read().map_err(|_| StoreError::Poisoned)?;
        match flag.as_ref() {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_customer(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        let map = self.customers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&(shop_id, customer_id)).cloned())
    }

    fn get_invoice(
        &self,
        shop_id: ShopId,
        invoice_id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let map = self.invoices.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&(shop_id, invoice_id)).cloned())
    }

    fn get_invoice_by_number(
        &self,
        shop_id: ShopId,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let numbers = self
            .invoice_numbers
            .read()
            .map_err(|_| StoreError::Poisoned)?;
        let Some(invoice_id) = numbers.get(&(shop_id, invoice_number.to_string())).copied()
        else {
            return Ok(None);
        };
        drop(numbers);
        self.get_invoice(shop_id, invoice_id)
    }

    fn save_customer(&self, shop_id: ShopId, customer: &Customer) -> Result<(), StoreError> {
        Self::check_writable(&self.fail_customer_writes)?;
        let mut map = self.customers.write().map_err(|_| StoreError::Poisoned)?;
        map.insert((shop_id, customer.id_typed()), customer.clone());
        Ok(())
    }

    fn save_invoice(&self, shop_id: ShopId, invoice: &Invoice) -> Result<(), StoreError> {
        Self::check_writable(&self.fail_invoice_writes)?;
        let mut map = self.invoices.write().map_err(|_| StoreError::Poisoned)?;
        let mut numbers = self
            .invoice_numbers
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        numbers.insert(
            (shop_id, invoice.invoice_number().to_string()),
            invoice.id_typed(),
        );
        map.insert((shop_id, invoice.id_typed()), invoice.clone());
        Ok(())
    }
}
