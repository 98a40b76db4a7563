//! Quiz Arena - real-time PvP quiz matchmaking service
//!
//! This crate pairs online players into skill-balanced, timed quiz matches
//! and drives each match from queue admission through adaptive-difficulty
//! gameplay to scoring and rating updates.

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod matchmaking;
pub mod metrics;
pub mod persistence;
pub mod question;
pub mod rating;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ArenaError, Result};
pub use types::*;

// Re-export key components
pub use events::{EventSink, OutboundEvent};
pub use matchmaking::{EnqueueOutcome, MatchCoordinator};
pub use service::{AppState, ArenaService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
