/// Decide and apply a command in one step (no persistence, no publication).
///
/// Handy for domain tests and for workflows that need the post-command state
/// of an aggregate before staging more commands in the same unit of work.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: umrahops_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
