//! Client-side session detection and the navigation gate built on it.
//!
//! The session is never written here: a login flow persists the user record
//! and bearer token, and this module only checks that both are present.

mod gate;
mod store;

pub use gate::{GateDecision, GateState, SessionGate};
#[cfg(test)]
pub use store::Session;
pub use store::{FileSessionStore, SessionStore};
