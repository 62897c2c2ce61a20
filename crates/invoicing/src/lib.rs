//! Invoicing domain module (khata sales invoices, event-driven).
//!
//! An invoice is the unit of sale: line items with per-unit tax and extra
//! charges (making charges, wastage, hallmarking fees), plus an ordered list
//! of payments against it. Every mutation recomputes `total_amount` from the
//! item list and keeps `paid_amount == Σ payments`; the aggregate never
//! trusts a caller-supplied total.
//!
//! The derived quantity that matters downstream is the unpaid amount,
//! `total_amount − paid_amount`; the ledger crate turns changes in it into
//! customer balance deltas.

pub mod invoice;
pub mod line;
pub mod payment;

pub use invoice::{
    AddLineItem, AddPayment, CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceEvent,
    InvoiceId, LineItemAdded, LineItemRemoved, LineItemUpdated, NotesUpdated, PaymentAdded,
    PaymentRemoved, RemoveLineItem, RemovePayment, UpdateLineItem, UpdateNotes,
};
pub use line::{ExtraCharge, LineItem, LineItemId};
pub use payment::{Payment, PaymentId};
