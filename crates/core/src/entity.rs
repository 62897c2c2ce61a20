//! Entity trait: identity that survives attribute changes.

/// Marker + minimal interface for entities held inside an aggregate.
///
/// An entity keeps its identity while its attributes change: a line item
/// stays the same line item after a quantity edit, a payment stays the same
/// payment however its notes are amended. Contrast with `ValueObject`, where
/// equality is the value itself.
pub trait Entity {
    /// Strongly-typed entity identifier, stable for the entity's lifetime.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
