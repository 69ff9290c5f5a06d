//! Domain layer - wire-level vocabulary of the event distribution core.

pub mod events;
pub mod foundation;
