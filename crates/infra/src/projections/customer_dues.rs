//! Customer Dues Projection.
//!
//! Tracks per-customer invoiced/paid/outstanding rollups derived from
//! invoice events. This is the read model behind the "who owes what"
//! screen; it is disposable and rebuildable from the event history.

use std::collections::HashMap;

use khata_core::{AggregateId, Money, ShopId};
use khata_customers::CustomerId;
use khata_events::{EventEnvelope, Projection};
use khata_invoicing::InvoiceEvent;

use crate::read_model::ShopStore;

/// Read model: per-customer dues rollup for a shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDues {
    pub customer_id: CustomerId,
    pub customer_name: String,
    /// Sum of invoice totals across all of the customer's invoices.
    pub total_invoiced: Money,
    /// Sum of payments across all of the customer's invoices.
    pub total_paid: Money,
    /// Sum of unpaid amounts; what the customer currently owes.
    pub outstanding: Money,
    /// Invoices with a non-zero unpaid amount.
    pub open_invoice_count: u32,
}

impl CustomerDues {
    fn new(customer_id: CustomerId, customer_name: String) -> Self {
        Self {
            customer_id,
            customer_name,
            total_invoiced: Money::zero(),
            total_paid: Money::zero(),
            outstanding: Money::zero(),
            open_invoice_count: 0,
        }
    }
}

/// Last-seen totals per invoice, so later events (which carry only the new
/// totals) can be turned into deltas against the customer rollup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InvoiceTotals {
    customer_id: CustomerId,
    customer_name: String,
    total_amount: Money,
    paid_amount: Money,
}

impl InvoiceTotals {
    fn unpaid(&self) -> Money {
        self.total_amount - self.paid_amount
    }

    fn is_open(&self) -> bool {
        self.unpaid().is_positive()
    }
}

/// Customer dues projection: aggregates outstanding amounts per customer.
///
/// Rebuildable from invoice events. Shop-isolated.
#[derive(Debug)]
pub struct CustomerDuesProjection<S>
where
    S: ShopStore<CustomerId, CustomerDues>,
{
    store: S,
    invoice_totals: HashMap<(ShopId, AggregateId), InvoiceTotals>,
}

impl<S> CustomerDuesProjection<S>
where
    S: ShopStore<CustomerId, CustomerDues>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            invoice_totals: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn record_totals(
        &mut self,
        shop_id: ShopId,
        aggregate_id: AggregateId,
        new_total: Money,
        new_paid: Money,
    ) {
        let Some(previous) = self.invoice_totals.get(&(shop_id, aggregate_id)).cloned() else {
            // An event for an invoice whose creation we never saw; nothing
            // to attribute the delta to.
            tracing::warn!(
                %shop_id,
                %aggregate_id,
                "customer_dues: event for unknown invoice, skipping"
            );
            return;
        };

        let updated = InvoiceTotals {
            total_amount: new_total,
            paid_amount: new_paid,
            ..previous.clone()
        };

        let mut dues = self
            .store
            .get(shop_id, &previous.customer_id)
            .unwrap_or_else(|| {
                CustomerDues::new(previous.customer_id, previous.customer_name.clone())
            });

        dues.total_invoiced =
            dues.total_invoiced + (updated.total_amount - previous.total_amount);
        dues.total_paid = dues.total_paid + (updated.paid_amount - previous.paid_amount);
        dues.outstanding = dues.outstanding + (updated.unpaid() - previous.unpaid());
        match (previous.is_open(), updated.is_open()) {
            (false, true) => dues.open_invoice_count += 1,
            (true, false) => dues.open_invoice_count = dues.open_invoice_count.saturating_sub(1),
            _ => {}
        }

        self.store.upsert(shop_id, previous.customer_id, dues);
        self.invoice_totals
            .insert((shop_id, aggregate_id), updated);
    }
}

impl<S> Projection for CustomerDuesProjection<S>
where
    S: ShopStore<CustomerId, CustomerDues>,
{
    type Ev = InvoiceEvent;

    fn apply(&mut self, envelope: &EventEnvelope<InvoiceEvent>) {
        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();

        match envelope.payload() {
            InvoiceEvent::InvoiceCreated(e) => {
                let totals = InvoiceTotals {
                    customer_id: e.customer_id,
                    customer_name: e.customer_name.clone(),
                    total_amount: e.total_amount,
                    paid_amount: Money::zero(),
                };

                let mut dues = self
                    .store
                    .get(shop_id, &e.customer_id)
                    .unwrap_or_else(|| CustomerDues::new(e.customer_id, e.customer_name.clone()));
                dues.customer_name = e.customer_name.clone();
                dues.total_invoiced = dues.total_invoiced + totals.total_amount;
                dues.outstanding = dues.outstanding + totals.unpaid();
                if totals.is_open() {
                    dues.open_invoice_count += 1;
                }

                self.store.upsert(shop_id, e.customer_id, dues);
                self.invoice_totals.insert((shop_id, aggregate_id), totals);
            }
            InvoiceEvent::LineItemAdded(e) => {
                self.record_totals(shop_id, aggregate_id, e.new_total_amount, e.new_paid_amount);
            }
            InvoiceEvent::LineItemUpdated(e) => {
                self.record_totals(shop_id, aggregate_id, e.new_total_amount, e.new_paid_amount);
            }
            InvoiceEvent::LineItemRemoved(e) => {
                self.record_totals(shop_id, aggregate_id, e.new_total_amount, e.new_paid_amount);
            }
            InvoiceEvent::PaymentAdded(e) => {
                let total = self
                    .invoice_totals
                    .get(&(shop_id, aggregate_id))
                    .map(|t| t.total_amount)
                    .unwrap_or_else(Money::zero);
                self.record_totals(shop_id, aggregate_id, total, e.new_paid_amount);
            }
            InvoiceEvent::PaymentRemoved(e) => {
                let total = self
                    .invoice_totals
                    .get(&(shop_id, aggregate_id))
                    .map(|t| t.total_amount)
                    .unwrap_or_else(Money::zero);
                self.record_totals(shop_id, aggregate_id, total, e.new_paid_amount);
            }
            InvoiceEvent::NotesUpdated(_) => {}
        }
    }
}
