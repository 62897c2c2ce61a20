//! `khata-events` — event plumbing shared across the domain crates.
//!
//! Mechanics only, no business rules: the `Event` trait, shop-scoped
//! envelopes, a pub/sub bus abstraction with an in-memory implementation,
//! and projection/read-model building blocks.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
