/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events (no mutation).
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// The aggregate maintains its own version tracking during `apply()`
/// (+1 per event). Persistence and publication are the caller's concern;
/// the reconciler wraps this with the document-store save cycle.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: khata_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
