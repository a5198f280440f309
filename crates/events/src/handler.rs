/// Execute an aggregate command in place (no IO).
///
/// 1. **Decide**: `aggregate.handle(command)` validates and returns events
///    without touching state.
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// If `handle` rejects the command the aggregate is untouched. Callers that
/// must be able to roll back after a later failure (e.g. persistence) run this
/// on a copy and only publish the copy once it is stored.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockledger_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
