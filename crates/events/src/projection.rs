use crate::{Event, EventEnvelope};

/// A projection builds a read model from an ordered event stream.
///
/// Projections transform events (write side) into queryable state (read
/// side): per-customer dues, open-invoice lists, report rollups. Read models
/// are **disposable**: they can be deleted and rebuilt by replaying events,
/// since the persisted snapshots plus the event history are the source of
/// truth.
///
/// Projections must be **idempotent**: applying the same event twice must
/// produce the same read model (the bus is at-least-once). The
/// `ProjectionRunner` helps by tracking per-stream sequence numbers and
/// rejecting out-of-order envelopes, but implementations should stay
/// idempotent at the domain level too.
///
/// Persistence of the read model is outside this crate; implementations may
/// hold a HashMap for tests or write through to a real store.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// The envelope includes `shop_id`, which must be used to scope read
    /// model updates; a projection never mixes shops.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
