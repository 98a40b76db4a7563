//! Registry of live game rooms
//!
//! Guarantees a player belongs to at most one still-valid room. Rooms are
//! handed out as `Arc<Mutex<GameRoom>>`; callers lock a room only for the
//! duration of a state-machine call.

use crate::error::{ArenaError, Result};
use crate::game::room::GameRoom;
use crate::game::GameSettings;
use crate::question::QuestionSelector;
use crate::types::{GameState, OnlinePlayer, PlayerId, RoomId};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Aggregate statistics about room lifecycle
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub rooms_created: u64,
    pub rooms_removed: u64,
    pub stale_purged: u64,
    pub active_rooms: usize,
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, Arc<Mutex<GameRoom>>>,
    by_player: HashMap<PlayerId, RoomId>,
}

/// Owner of all live rooms and the player → room index
pub struct GameRoomManager {
    inner: Mutex<Inner>,
    selector: Arc<QuestionSelector>,
    settings: GameSettings,
    stats: Mutex<RoomStats>,
}

impl GameRoomManager {
    pub fn new(selector: Arc<QuestionSelector>, settings: GameSettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            selector,
            settings,
            stats: Mutex::new(RoomStats::default()),
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire room manager lock".to_string(),
            }
            .into()
        })
    }

    /// Create a room for a matched pair. If either player is mapped to a
    /// room already, the mapping is purged when the room is completed
    /// (stale) and creation proceeds; a still-valid room fails the call.
    pub fn create_room(
        &self,
        players: [OnlinePlayer; 2],
    ) -> Result<(RoomId, Arc<Mutex<GameRoom>>)> {
        let mut inner = self.lock()?;

        for player in &players {
            if let Some(existing_id) = inner.by_player.get(&player.id).cloned() {
                let is_stale = inner
                    .rooms
                    .get(&existing_id)
                    .map(|room| {
                        room.lock()
                            .map(|r| r.state() == GameState::Completed)
                            .unwrap_or(true)
                    })
                    // A dangling mapping with no room behind it is stale too
                    .unwrap_or(true);

                if is_stale {
                    warn!(
                        "Purging stale room mapping {} for player {}",
                        existing_id, player.id
                    );
                    Self::remove_locked(&mut inner, &existing_id);
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.stale_purged += 1;
                    }
                } else {
                    return Err(ArenaError::AlreadyInGame {
                        player_id: player.id.clone(),
                    }
                    .into());
                }
            }
        }

        let room = GameRoom::new(players, self.selector.clone(), self.settings.clone());
        let room_id = room.id().clone();
        for player in room.players() {
            inner.by_player.insert(player.id.clone(), room_id.clone());
        }
        inner.rooms.insert(room_id.clone(), Arc::new(Mutex::new(room)));

        if let Ok(mut stats) = self.stats.lock() {
            stats.rooms_created += 1;
            stats.active_rooms = inner.rooms.len();
        }

        info!("Created game room {}", room_id);
        Ok((room_id.clone(), inner.rooms[&room_id].clone()))
    }

    /// The room a player is currently mapped to.
    pub fn room_for(&self, player_id: &PlayerId) -> Result<Option<Arc<Mutex<GameRoom>>>> {
        let inner = self.lock()?;
        Ok(inner
            .by_player
            .get(player_id)
            .and_then(|room_id| inner.rooms.get(room_id))
            .cloned())
    }

    /// Whether a player is mapped to a room that is not completed.
    pub fn has_valid_room(&self, player_id: &PlayerId) -> Result<bool> {
        Ok(self
            .room_for(player_id)?
            .map(|room| {
                room.lock()
                    .map(|r| r.state() != GameState::Completed)
                    .unwrap_or(false)
            })
            .unwrap_or(false))
    }

    pub fn room(&self, room_id: &RoomId) -> Result<Option<Arc<Mutex<GameRoom>>>> {
        let inner = self.lock()?;
        Ok(inner.rooms.get(room_id).cloned())
    }

    /// Remove a room and its player mappings.
    pub fn remove_room(&self, room_id: &RoomId) -> Result<bool> {
        let mut inner = self.lock()?;
        let removed = Self::remove_locked(&mut inner, room_id);
        if removed {
            if let Ok(mut stats) = self.stats.lock() {
                stats.rooms_removed += 1;
                stats.active_rooms = inner.rooms.len();
            }
            debug!("Removed game room {}", room_id);
        }
        Ok(removed)
    }

    fn remove_locked(inner: &mut Inner, room_id: &RoomId) -> bool {
        let removed = inner.rooms.remove(room_id).is_some();
        inner
            .by_player
            .retain(|_, mapped_id| mapped_id != room_id);
        removed
    }

    /// Rooms older than the reclamation ceiling, regardless of state.
    /// The caller force-ends and removes them.
    pub fn stale_rooms(&self) -> Result<Vec<(RoomId, Arc<Mutex<GameRoom>>)>> {
        let inner = self.lock()?;
        let now = current_timestamp();
        Ok(inner
            .rooms
            .iter()
            .filter(|(_, room)| room.lock().map(|r| r.is_stale(now)).unwrap_or(true))
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect())
    }

    pub fn active_room_count(&self) -> Result<usize> {
        Ok(self.lock()?.rooms.len())
    }

    pub fn stats(&self) -> Result<RoomStats> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| ArenaError::InternalError {
                message: "Failed to acquire room stats lock".to_string(),
            })?
            .clone();
        stats.active_rooms = self.lock()?.rooms.len();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::StaticQuestionSource;
    use crate::types::{Difficulty, EndReason};

    fn player(id: &str, rating: i32) -> OnlinePlayer {
        OnlinePlayer {
            id: id.to_string(),
            connection: format!("conn-{}", id),
            username: format!("user-{}", id),
            rating,
            difficulty: Difficulty::Medium,
            time_limit_seconds: 60,
            tags: vec![],
            in_game: false,
            joined_at: current_timestamp(),
            last_activity: current_timestamp(),
        }
    }

    fn manager() -> GameRoomManager {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        GameRoomManager::new(selector, GameSettings::default())
    }

    #[test]
    fn test_create_and_lookup() {
        let manager = manager();
        let (room_id, _room) = manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();

        assert!(manager.room(&room_id).unwrap().is_some());
        assert!(manager.room_for(&"a".to_string()).unwrap().is_some());
        assert!(manager.room_for(&"b".to_string()).unwrap().is_some());
        assert_eq!(manager.active_room_count().unwrap(), 1);
    }

    #[test]
    fn test_second_room_for_busy_player_fails() {
        let manager = manager();
        manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();

        let err = manager
            .create_room([player("a", 1000), player("c", 1200)])
            .unwrap_err();
        assert!(err.to_string().contains("already in a game"));
    }

    #[test]
    fn test_completed_room_is_purged_on_create() {
        let manager = manager();
        let (old_id, room) = manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();

        {
            let mut room = room.lock().unwrap();
            room.start().unwrap();
            room.end(EndReason::Normal, None).unwrap();
        }

        // Mapping still exists but points at a completed room → purged
        let (new_id, _) = manager
            .create_room([player("a", 1000), player("c", 1200)])
            .unwrap();
        assert_ne!(old_id, new_id);
        assert!(manager.room(&old_id).unwrap().is_none());
        assert!(manager.room_for(&"b".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_remove_room_clears_mappings() {
        let manager = manager();
        let (room_id, _) = manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();

        assert!(manager.remove_room(&room_id).unwrap());
        assert!(!manager.remove_room(&room_id).unwrap());
        assert!(manager.room_for(&"a".to_string()).unwrap().is_none());
        assert_eq!(manager.active_room_count().unwrap(), 0);
    }

    #[test]
    fn test_stale_rooms_by_age() {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        let manager = GameRoomManager::new(
            selector,
            GameSettings {
                stale_room_ceiling: std::time::Duration::from_millis(0),
                ..GameSettings::default()
            },
        );
        manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(manager.stale_rooms().unwrap().len(), 1);
    }

    #[test]
    fn test_stats_track_lifecycle() {
        let manager = manager();
        let (room_id, _) = manager
            .create_room([player("a", 1000), player("b", 1100)])
            .unwrap();
        manager.remove_room(&room_id).unwrap();

        let stats = manager.stats().unwrap();
        assert_eq!(stats.rooms_created, 1);
        assert_eq!(stats.rooms_removed, 1);
        assert_eq!(stats.active_rooms, 0);
    }
}
