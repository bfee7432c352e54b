//! State Management Module
//!
//! Process-local leadership state, transition notification and the
//! election driver that keeps both up to date.

mod leadership;
mod notifier;
pub mod election;

pub use leadership::LeaderState;
pub use notifier::{ChangeHandler, Notifier};
pub use election::Election;
