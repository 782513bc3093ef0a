//! Dux Core - Slices, actions, and the state container.
//!
//! This crate holds the synchronous half of the system: slice states, the
//! transitions that mutate them, and the `Store` that routes dispatched
//! actions to exactly one slice. It performs no I/O.

pub mod action;
pub mod counter;
pub mod poke;
pub mod request;
pub mod store;

// Re-exports for convenience
pub use action::Action;
pub use counter::{CounterAction, CounterState};
pub use poke::{PokeAction, PokeState, Pokemon};
pub use request::RequestId;
pub use store::{RootState, Slice, Store};
