use khata_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent**: a request to perform an action on an
/// aggregate. They are transient and are transformed into events (which are
/// the accepted facts). Shop isolation is enforced at the event level
/// (envelopes); commands stay domain-focused.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
