//! Invoice reconciliation pipeline (application-level orchestration).
//!
//! Every invoice mutation runs through the same cycle:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load invoice snapshot from store (shop-scoped)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Save the new invoice snapshot
//!   ↓
//! 4. Apply the unpaid-amount delta to the customer balance and save it
//!   ↓
//! 5. Publish events to the bus (for read-model projections)
//! ```
//!
//! The invoice write and the customer-balance write are two separate
//! document writes with no transaction spanning them. A failure between
//! them leaves the committed invoice without its balance update; this is
//! surfaced as [`ReconcileError::BalanceWrite`] and logged, never silently
//! rolled back. Retrying the command is safe because every recomputation is
//! idempotent over the stored snapshots.

use thiserror::Error;
use uuid::Uuid;

use khata_core::{AggregateRoot, DomainError, Money, ShopId};
use khata_customers::{Customer, CustomerId};
use khata_events::{Command as _, EventBus, EventEnvelope, execute};
use khata_invoicing::{Invoice, InvoiceCommand, InvoiceEvent, InvoiceId};
use khata_ledger::{CreditCheck, apply_balance_change, balance_change, would_exceed_credit_limit};

use crate::document_store::{DocumentStore, StoreError};

pub const INVOICE_AGGREGATE_TYPE: &str = "invoicing.invoice";

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Domain validation or invariant failure; nothing was written.
    #[error("domain rejection: {0}")]
    Domain(#[from] DomainError),

    /// A read or the invoice write failed; nothing was committed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The command targets an invoice that is not in the store.
    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    /// The customer-balance write failed after the invoice write committed.
    /// The invoice snapshot in the store is the new one; the customer
    /// balance is stale until the cycle is retried.
    #[error("customer balance write failed after invoice commit: {source}")]
    BalanceWrite { source: StoreError },

    /// Event publication failed after both writes committed (at-least-once;
    /// retrying may duplicate envelopes, projections must stay idempotent).
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// What a completed reconciliation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The invoice snapshot as persisted.
    pub invoice: Invoice,
    /// The customer revision as persisted, if a balance update applied.
    /// `None` when the delta was zero or the customer record is gone (the
    /// invoice keeps displaying via its denormalized name/phone fields).
    pub customer: Option<Customer>,
    /// The raw (not sign-adjusted) balance delta this mutation produced.
    pub raw_balance_change: Money,
    pub events: Vec<EventEnvelope<InvoiceEvent>>,
}

/// Orchestrates invoice mutations against the document store and bus.
///
/// Generic over both so tests run fully in memory and a real deployment can
/// plug in its own backends without touching domain code.
#[derive(Debug)]
pub struct InvoiceReconciler<S, B> {
    store: S,
    bus: B,
}

impl<S, B> InvoiceReconciler<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> InvoiceReconciler<S, B>
where
    S: DocumentStore,
    B: EventBus<EventEnvelope<InvoiceEvent>>,
{
    /// Execute one invoice command through the full reconciliation cycle.
    ///
    /// For [`InvoiceCommand::CreateInvoice`] the prior state is an empty
    /// aggregate and the prior balance contribution is zero; every other
    /// command requires the invoice to exist in the store.
    pub fn execute(
        &self,
        shop_id: ShopId,
        command: InvoiceCommand,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let invoice_id = InvoiceId::new(command.target_aggregate_id());

        // 1) Load the current snapshot.
        let existing = self.store.get_invoice(shop_id, invoice_id)?;
        let (mut invoice, previous) = match (&command, existing) {
            (InvoiceCommand::CreateInvoice(_), prior) => {
                // Creation conflicts are decided by the aggregate itself if
                // a snapshot already exists.
                let previous = prior.clone();
                (prior.unwrap_or_else(|| Invoice::empty(invoice_id)), previous)
            }
            (_, Some(found)) => (found.clone(), Some(found)),
            (_, None) => return Err(ReconcileError::InvoiceNotFound(invoice_id)),
        };

        // 2) Decide and evolve. Pure; any rejection leaves the store as-is.
        let events = execute(&mut invoice, &command)?;
        if events.is_empty() {
            return Ok(ReconcileOutcome {
                invoice,
                customer: None,
                raw_balance_change: Money::zero(),
                events: vec![],
            });
        }

        // 3) Persist the invoice snapshot.
        self.store.save_invoice(shop_id, &invoice)?;

        // 4) Reconcile the customer balance from the unpaid-amount delta.
        let raw_change = balance_change(previous.as_ref(), &invoice);
        let customer = self.reconcile_balance(shop_id, &invoice, raw_change)?;

        // 5) Publish for read models, after both writes.
        let envelopes = self.publish(shop_id, &invoice, events)?;

        Ok(ReconcileOutcome {
            invoice,
            customer,
            raw_balance_change: raw_change,
            events: envelopes,
        })
    }

    /// Speculative credit check against the stored customer snapshot.
    ///
    /// `previous_invoice` is the stored state when checking an edit to an
    /// existing invoice; `None` means a brand-new invoice. Read-only.
    pub fn check_credit(
        &self,
        shop_id: ShopId,
        customer_id: CustomerId,
        invoice: &Invoice,
        previous_invoice: Option<&Invoice>,
    ) -> Result<Option<CreditCheck>, ReconcileError> {
        let Some(customer) = self.store.get_customer(shop_id, customer_id)? else {
            return Ok(None);
        };
        Ok(Some(would_exceed_credit_limit(
            &customer,
            invoice,
            previous_invoice,
        )))
    }

    fn reconcile_balance(
        &self,
        shop_id: ShopId,
        invoice: &Invoice,
        raw_change: Money,
    ) -> Result<Option<Customer>, ReconcileError> {
        if raw_change.is_zero() {
            return Ok(None);
        }

        let Some(customer_id) = invoice.customer_id() else {
            return Ok(None);
        };

        let customer = match self.store.get_customer(shop_id, customer_id) {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                // The customer record was deleted out from under the
                // invoice. The invoice stays displayable through its
                // denormalized customer fields; there is no balance to move.
                tracing::warn!(
                    %shop_id,
                    %customer_id,
                    invoice_id = %invoice.id_typed(),
                    "customer missing during balance reconciliation, skipping balance update"
                );
                return Ok(None);
            }
            Err(source) => {
                tracing::error!(
                    %shop_id,
                    %customer_id,
                    error = %source,
                    "customer read failed after invoice commit"
                );
                return Err(ReconcileError::BalanceWrite { source });
            }
        };

        let updated = apply_balance_change(&customer, raw_change);
        if let Err(source) = self.store.save_customer(shop_id, &updated) {
            // Known consistency gap: the invoice write already committed and
            // is not rolled back. Logged and surfaced; the caller may retry
            // the whole cycle.
            tracing::error!(
                %shop_id,
                %customer_id,
                invoice_id = %invoice.id_typed(),
                raw_change = %raw_change,
                error = %source,
                "customer balance write failed after invoice commit"
            );
            return Err(ReconcileError::BalanceWrite { source });
        }

        tracing::debug!(
            %shop_id,
            %customer_id,
            raw_change = %raw_change,
            new_balance = %updated.current_balance(),
            "customer balance reconciled"
        );

        Ok(Some(updated))
    }

    fn publish(
        &self,
        shop_id: ShopId,
        invoice: &Invoice,
        events: Vec<InvoiceEvent>,
    ) -> Result<Vec<EventEnvelope<InvoiceEvent>>, ReconcileError> {
        // Sequence numbers are the aggregate versions the events produced:
        // the final version minus the tail of the batch.
        let base_version = invoice.version() - events.len() as u64;
        let mut envelopes = Vec::with_capacity(events.len());

        for (offset, event) in events.into_iter().enumerate() {
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                shop_id,
                invoice.id_typed().0,
                INVOICE_AGGREGATE_TYPE,
                base_version + offset as u64 + 1,
                event,
            );
            self.bus
                .publish(envelope.clone())
                .map_err(|e| ReconcileError::Publish(format!("{e:?}")))?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }
}
