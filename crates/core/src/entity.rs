//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Reference data such as products implement this; event-sourced models use
/// [`crate::AggregateRoot`] instead.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
