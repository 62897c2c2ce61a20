//! Infrastructure layer: persistence, reconciliation orchestration, read models.
//!
//! Domain crates stay pure; everything that touches storage or the event bus
//! lives here. The centerpiece is the [`reconciler::InvoiceReconciler`],
//! which wraps every invoice mutation in the load → decide → save invoice →
//! update customer balance → publish cycle.

pub mod document_store;
pub mod projections;
pub mod read_model;
pub mod reconciler;

#[cfg(test)]
mod integration_tests;
