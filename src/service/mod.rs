//! Service wiring and the inbound operation surface
//!
//! `ArenaService` is the per-connection operation surface the transport
//! layer calls into; `AppState` wires every component together and runs the
//! background maintenance tasks.

pub mod app;
pub mod session;

pub use app::{AppState, Collaborators};
pub use session::{ArenaService, RegisterRequest};
