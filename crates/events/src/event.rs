use chrono::{DateTime, Utc};

/// A committed domain fact.
///
/// Events record what an aggregate decided: an invoice was created, a
/// payment was recorded, a credit limit changed. They are immutable once
/// emitted and carry the business timestamp of the action, not the wall
/// clock of whoever replays them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "invoicing.invoice.payment_added"). Read
    /// models and exporters match on this string, so it never changes for a
    /// given event shape.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the action happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
