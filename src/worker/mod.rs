//! Offline cache controller.
//!
//! Runs outside the page as an event-driven actor with the lifecycle
//! Install -> Activate -> ready to serve:
//! - install opens the current cache generation and caches the shell assets
//! - activate deletes every stale generation
//! - fetch applies cache-first with network fallback to allow-listed routes,
//!   serving the cached shell when the network is unreachable

mod controller;
mod lifecycle;
mod registration;
mod runtime;

pub use controller::ControllerSettings;
pub use lifecycle::WorkerState;
pub use registration::Registrar;
pub use runtime::WorkerHandle;
