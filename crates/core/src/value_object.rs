//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; to
/// "modify" one, create a new one. `Money` is a value object, a `Customer`
/// is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
