//! Match lifecycle: rooms, scoring, and the driver that runs them
//!
//! A `GameRoom` is the per-match state machine; the `GameRoomManager` keeps
//! the registry of live rooms and the one-room-per-player invariant; the
//! `GameDriver` owns the timed transitions (delayed start, duration expiry,
//! stale reap) and the exactly-once finish path.

pub mod driver;
pub mod manager;
pub mod room;
pub mod scoring;

pub use driver::GameDriver;
pub use manager::{GameRoomManager, RoomStats};
pub use room::{GameRoom, SubmitOutcome};

use std::time::Duration;

/// Per-match policy knobs
#[derive(Debug, Clone)]
pub struct GameSettings {
    /// Questions each player plays through
    pub questions_per_game: u32,
    /// Total wall-clock time a match may run once started
    pub game_duration: Duration,
    /// Delay between match-found and game-started, so both clients can
    /// render the matchup
    pub start_delay: Duration,
    /// Age at which a room is force-ended regardless of state
    pub stale_room_ceiling: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            questions_per_game: 10,
            game_duration: Duration::from_secs(60),
            start_delay: Duration::from_secs(3),
            stale_room_ceiling: Duration::from_secs(1800),
        }
    }
}
