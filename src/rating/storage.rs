//! Durable rating storage interface
//!
//! The document store holding player profiles is an external collaborator;
//! the core only ever applies signed deltas to it. Failures here are logged
//! by callers and never block match teardown.

use crate::error::Result;
use crate::types::{Difficulty, PlayerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Applies rating deltas to the durable player profile store
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Apply a signed delta to a player's rating for a difficulty tier.
    /// Returns the new rating when the backend reports it.
    async fn apply_delta(
        &self,
        player_id: &PlayerId,
        difficulty: Difficulty,
        delta: i32,
    ) -> Result<Option<i32>>;
}

/// In-memory rating store for tests and the queue-tester binary
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    ratings: Mutex<HashMap<(PlayerId, Difficulty), i32>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a starting rating.
    pub fn seed(&self, player_id: &str, difficulty: Difficulty, rating: i32) {
        if let Ok(mut ratings) = self.ratings.lock() {
            ratings.insert((player_id.to_string(), difficulty), rating);
        }
    }

    /// Current rating, if any delta or seed has been applied.
    pub fn rating_of(&self, player_id: &str, difficulty: Difficulty) -> Option<i32> {
        self.ratings
            .lock()
            .ok()
            .and_then(|ratings| ratings.get(&(player_id.to_string(), difficulty)).copied())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn apply_delta(
        &self,
        player_id: &PlayerId,
        difficulty: Difficulty,
        delta: i32,
    ) -> Result<Option<i32>> {
        let mut ratings = self.ratings.lock().map_err(|_| {
            crate::error::ArenaError::InternalError {
                message: "Failed to acquire rating store lock".to_string(),
            }
        })?;
        let entry = ratings.entry((player_id.clone(), difficulty)).or_insert(0);
        *entry += delta;
        Ok(Some(*entry))
    }
}
