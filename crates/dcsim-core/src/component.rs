//! Simulation component identity.

/// Identifier of simulation component.
///
/// Identifiers are assigned sequentially starting from 0 in the order of component registration.
pub type Id = u32;
