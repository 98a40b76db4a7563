//! Live-player registry
//!
//! Maps live connections to ephemeral online-player records. Reconnecting
//! with the same identity replaces the connection handle rather than
//! duplicating the record; a disconnected identity survives for a short
//! grace period so a reconnect can pick it back up.

use crate::error::{ArenaError, Result};
use crate::types::{ConnectionId, Difficulty, OnlinePlayer, PlayerId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Registry policy knobs. Grace and inactivity windows are independent.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a disconnected identity is kept for reconnection
    pub reconnect_grace: Duration,
    /// How long an idle (not in game) player may stay registered
    pub inactivity_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(5),
            inactivity_timeout: Duration::from_secs(600),
        }
    }
}

/// Registration payload for a connecting player
#[derive(Debug, Clone)]
pub struct Registration {
    pub player_id: PlayerId,
    pub username: String,
    pub rating: i32,
    pub difficulty: Difficulty,
    pub time_limit_seconds: u32,
    pub tags: Vec<String>,
}

/// Occupancy statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total_online: usize,
    pub in_game: usize,
    pub searching_or_idle: usize,
    pub by_difficulty: HashMap<String, usize>,
}

struct PlayerEntry {
    player: OnlinePlayer,
    disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    by_connection: HashMap<ConnectionId, PlayerId>,
    players: HashMap<PlayerId, PlayerEntry>,
}

/// Owned, lock-guarded registry of online players
pub struct PlayerRegistry {
    inner: Mutex<Inner>,
    config: RegistryConfig,
}

impl PlayerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire registry lock".to_string(),
            }
            .into()
        })
    }

    /// Register a player for a connection. If the identity is already known
    /// the old connection mapping is replaced and preferences are refreshed.
    pub fn register(
        &self,
        connection: ConnectionId,
        registration: Registration,
    ) -> Result<OnlinePlayer> {
        let mut inner = self.lock()?;
        let now = current_timestamp();

        if let Some(entry) = inner.players.get_mut(&registration.player_id) {
            debug!("Player {} reconnected", registration.player_id);
            let old_connection = entry.player.connection.clone();
            entry.player.connection = connection.clone();
            entry.player.username = registration.username;
            entry.player.rating = registration.rating;
            entry.player.difficulty = registration.difficulty;
            entry.player.time_limit_seconds = registration.time_limit_seconds;
            entry.player.tags = registration.tags;
            entry.player.last_activity = now;
            entry.disconnected_at = None;

            let player = entry.player.clone();
            inner.by_connection.remove(&old_connection);
            inner.by_connection.insert(connection, player.id.clone());
            return Ok(player);
        }

        let player = OnlinePlayer {
            id: registration.player_id.clone(),
            connection: connection.clone(),
            username: registration.username,
            rating: registration.rating,
            difficulty: registration.difficulty,
            time_limit_seconds: registration.time_limit_seconds,
            tags: registration.tags,
            in_game: false,
            joined_at: now,
            last_activity: now,
        };

        inner
            .by_connection
            .insert(connection, registration.player_id.clone());
        inner.players.insert(
            registration.player_id.clone(),
            PlayerEntry {
                player: player.clone(),
                disconnected_at: None,
            },
        );

        info!("Player registered: {} ({})", player.username, player.id);
        Ok(player)
    }

    /// Look up the player bound to a connection.
    pub fn player_by_connection(&self, connection: &ConnectionId) -> Result<Option<OnlinePlayer>> {
        let inner = self.lock()?;
        Ok(inner
            .by_connection
            .get(connection)
            .and_then(|id| inner.players.get(id))
            .map(|entry| entry.player.clone()))
    }

    /// Look up a player by identity.
    pub fn player_by_id(&self, player_id: &PlayerId) -> Result<Option<OnlinePlayer>> {
        let inner = self.lock()?;
        Ok(inner.players.get(player_id).map(|entry| entry.player.clone()))
    }

    /// Flip the busy flag. Returns false if the identity is unknown.
    pub fn set_in_game(&self, player_id: &PlayerId, in_game: bool) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.players.get_mut(player_id) {
            Some(entry) => {
                entry.player.in_game = in_game;
                entry.player.last_activity = current_timestamp();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record activity on a connection.
    pub fn touch(&self, connection: &ConnectionId) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(id) = inner.by_connection.get(connection).cloned() {
            if let Some(entry) = inner.players.get_mut(&id) {
                entry.player.last_activity = current_timestamp();
            }
        }
        Ok(())
    }

    /// Drop the connection mapping and start the reconnection grace window.
    /// Returns the affected player, if any.
    pub fn disconnect(&self, connection: &ConnectionId) -> Result<Option<OnlinePlayer>> {
        let mut inner = self.lock()?;
        let Some(player_id) = inner.by_connection.remove(connection) else {
            return Ok(None);
        };
        let Some(entry) = inner.players.get_mut(&player_id) else {
            return Ok(None);
        };
        entry.disconnected_at = Some(current_timestamp());
        Ok(Some(entry.player.clone()))
    }

    /// Remove identities whose reconnection grace elapsed and idle players
    /// past the inactivity timeout. Players in a game are never reaped here;
    /// the room sweep owns that path. Returns removed identities.
    pub fn reap(&self) -> Result<Vec<PlayerId>> {
        let mut inner = self.lock()?;
        let now = current_timestamp();
        let grace = ChronoDuration::from_std(self.config.reconnect_grace)
            .unwrap_or_else(|_| ChronoDuration::seconds(5));
        let idle_limit = ChronoDuration::from_std(self.config.inactivity_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(600));

        let expired: Vec<PlayerId> = inner
            .players
            .iter()
            .filter(|(_, entry)| {
                if entry.player.in_game {
                    return false;
                }
                match entry.disconnected_at {
                    Some(at) => now - at > grace,
                    None => now - entry.player.last_activity > idle_limit,
                }
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = inner.players.remove(id) {
                inner.by_connection.remove(&entry.player.connection);
                debug!("Reaped player {} ({})", entry.player.username, id);
            }
        }

        Ok(expired)
    }

    /// Occupancy statistics.
    pub fn stats(&self) -> Result<RegistryStats> {
        let inner = self.lock()?;
        let mut stats = RegistryStats {
            total_online: inner.players.len(),
            ..Default::default()
        };
        for entry in inner.players.values() {
            if entry.player.in_game {
                stats.in_game += 1;
            } else {
                stats.searching_or_idle += 1;
            }
            *stats
                .by_difficulty
                .entry(entry.player.difficulty.to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }

    pub fn online_count(&self) -> Result<usize> {
        Ok(self.lock()?.players.len())
    }
}
