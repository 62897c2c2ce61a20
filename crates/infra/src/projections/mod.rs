//! Read-model projections over invoice events.

pub mod customer_dues;

pub use customer_dues::{CustomerDues, CustomerDuesProjection};
