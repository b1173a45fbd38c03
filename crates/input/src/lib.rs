//! Desktop input reduced to actions, then to fly camera move and look input.
//!
//! # Invariants
//! - Windowing code only translates platform keys into [`Key`]; everything
//!   downstream sees [`Action`]s.
//! - Look deltas accumulate between frames and are consumed exactly once.

pub mod action;
pub mod state;

pub use action::{Action, Bindings, BindingError, Key};
pub use state::InputState;
