//! Timed match transitions and the finish path
//!
//! The driver owns everything that happens to a room on a clock: the delayed
//! start after match-found, the total-duration timer, and the stale-room
//! sweep. It also owns the single finish path that persists results, applies
//! rating deltas and notifies both sides, guarded against double invocation
//! by the room's own completed-state check.

use crate::error::{ArenaError, Result};
use crate::events::{EventSink, OutboundEvent};
use crate::game::room::GameRoom;
use crate::game::{GameRoomManager, GameSettings};
use crate::metrics::MetricsCollector;
use crate::persistence::{MatchRecord, MatchStore, PushNotifier};
use crate::rating::RatingStore;
use crate::registry::PlayerRegistry;
use crate::types::{EndReason, GameResults, PlayerId, RoomId};
use crate::utils::current_timestamp;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Runs rooms through their timed transitions
pub struct GameDriver {
    rooms: Arc<GameRoomManager>,
    registry: Arc<PlayerRegistry>,
    events: Arc<dyn EventSink>,
    match_store: Arc<dyn MatchStore>,
    rating_store: Arc<dyn RatingStore>,
    notifier: Arc<dyn PushNotifier>,
    metrics: Arc<MetricsCollector>,
    settings: GameSettings,
}

impl GameDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rooms: Arc<GameRoomManager>,
        registry: Arc<PlayerRegistry>,
        events: Arc<dyn EventSink>,
        match_store: Arc<dyn MatchStore>,
        rating_store: Arc<dyn RatingStore>,
        notifier: Arc<dyn PushNotifier>,
        metrics: Arc<MetricsCollector>,
        settings: GameSettings,
    ) -> Self {
        Self {
            rooms,
            registry,
            events,
            match_store,
            rating_store,
            notifier,
            metrics,
            settings,
        }
    }

    pub fn rooms(&self) -> Arc<GameRoomManager> {
        self.rooms.clone()
    }

    fn lock_room<'a>(room: &'a Arc<Mutex<GameRoom>>) -> Result<MutexGuard<'a, GameRoom>> {
        room.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire room lock".to_string(),
            }
            .into()
        })
    }

    /// Schedule the waiting→active transition after the post-match-found
    /// delay, and the duration timer behind it.
    pub fn schedule_start(self: Arc<Self>, room_id: RoomId) {
        let driver = self;
        tokio::spawn(async move {
            tokio::time::sleep(driver.settings.start_delay).await;
            if let Err(e) = driver.start_room(&room_id).await {
                warn!("Failed to start room {}: {}", room_id, e);
                return;
            }

            let expiry_driver = Arc::clone(&driver);
            let expiry_room = room_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(expiry_driver.settings.game_duration).await;
                match expiry_driver
                    .finish_room(&expiry_room, EndReason::Normal, None)
                    .await
                {
                    Ok(Some(_)) => info!("Room {} ended by time expiry", expiry_room),
                    Ok(None) => {}
                    Err(e) => warn!("Time-expiry finish failed for {}: {}", expiry_room, e),
                }
            });
        });
    }

    /// Transition a room to active and issue the first question to both
    /// players.
    pub async fn start_room(&self, room_id: &RoomId) -> Result<()> {
        let room_arc = self
            .rooms
            .room(room_id)?
            .ok_or_else(|| ArenaError::RoomNotFound {
                room_id: room_id.clone(),
            })?;

        let (issued, snapshot) = {
            let mut room = Self::lock_room(&room_arc)?;
            room.start()?;

            let player_ids: Vec<PlayerId> =
                room.players().iter().map(|p| p.id.clone()).collect();
            let mut issued = Vec::new();
            for player_id in player_ids {
                if let Some((index, question)) = room.next_question(&player_id)? {
                    issued.push((player_id, index, question));
                }
            }
            (issued, room.snapshot())
        };

        for (player_id, index, question) in issued {
            self.metrics.game().questions_served_total.inc();
            self.events
                .send(
                    &player_id,
                    OutboundEvent::GameStarted {
                        state: snapshot.clone(),
                        question,
                        question_index: index,
                    },
                )
                .await?;
        }

        info!("Game started: {}", room_id);
        Ok(())
    }

    /// Finish a room exactly once: compute results, persist, apply rating
    /// deltas, emit game-ended, tear down. Returns `None` when the room was
    /// already completed or already removed; the racing caller lost and
    /// nothing is emitted twice.
    pub async fn finish_room(
        &self,
        room_id: &RoomId,
        reason: EndReason,
        disconnector: Option<PlayerId>,
    ) -> Result<Option<GameResults>> {
        let Some(room_arc) = self.rooms.room(room_id)? else {
            return Ok(None);
        };

        let (results, difficulty) = {
            let mut room = Self::lock_room(&room_arc)?;
            if let Some(leaver) = &disconnector {
                room.mark_disconnected(leaver);
            }
            let difficulty = room.summary().difficulty;
            (room.end(reason, disconnector.as_ref())?, difficulty)
        };

        let Some(results) = results else {
            return Ok(None);
        };

        // Persistence failures are logged, never allowed to block teardown
        let record = Self::to_record(&results);
        if let Err(e) = self.match_store.record_match(record).await {
            error!("Failed to persist match {}: {}", room_id, e);
        }

        for result in &results.players {
            if let Err(e) = self
                .rating_store
                .apply_delta(&result.player_id, difficulty, result.rating_delta)
                .await
            {
                error!(
                    "Failed to apply rating delta for {}: {}",
                    result.player_id, e
                );
            }
            if let Err(e) = self.registry.set_in_game(&result.player_id, false) {
                warn!("Failed to clear busy flag for {}: {}", result.player_id, e);
            }
            self.events
                .send(
                    &result.player_id,
                    OutboundEvent::GameEnded {
                        reason,
                        results: results.clone(),
                    },
                )
                .await?;
        }

        if let Some(leaver) = &disconnector {
            if let Some(remaining) = results
                .players
                .iter()
                .find(|p| &p.player_id != leaver)
                .map(|p| p.player_id.clone())
            {
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify_opponent_disconnected(&remaining).await {
                        warn!("Opponent-disconnect push failed for {}: {}", remaining, e);
                    }
                });
            }
        }

        self.rooms.remove_room(room_id)?;
        self.metrics.record_room_completed(&reason.to_string());
        self.metrics
            .game()
            .active_rooms
            .set(self.rooms.active_room_count()? as i64);

        info!(
            "Room {} finished ({}), winner {}",
            room_id, reason, results.winner
        );
        Ok(Some(results))
    }

    /// Force-end rooms older than the reclamation ceiling. Returns how many
    /// were reaped.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let stale = self.rooms.stale_rooms()?;
        let mut reaped = 0;
        for (room_id, _) in stale {
            match self.finish_room(&room_id, EndReason::Stale, None).await {
                Ok(Some(_)) => {
                    self.metrics.game().rooms_reaped_total.inc();
                    reaped += 1;
                }
                Ok(None) => {
                    // Completed-but-unremoved zombie: tear the entry down
                    self.rooms.remove_room(&room_id)?;
                    reaped += 1;
                }
                Err(e) => warn!("Stale sweep failed for {}: {}", room_id, e),
            }
        }
        if reaped > 0 {
            info!("Stale-room sweep reaped {} rooms", reaped);
        }
        Ok(reaped)
    }

    fn to_record(results: &GameResults) -> MatchRecord {
        let p1 = &results.players[0];
        let p2 = &results.players[1];
        let winner = if p1.final_score == p2.final_score
            && p1.total_time_ms == p2.total_time_ms
            && results.end_reason == EndReason::Normal
        {
            // A perfect tie persists without a winner
            None
        } else {
            Some(results.winner.clone())
        };

        MatchRecord {
            room_id: results.room_id.clone(),
            player1: p1.player_id.clone(),
            player2: p2.player_id.clone(),
            score_player1: p1.final_score,
            score_player2: p2.final_score,
            winner,
            end_reason: results.end_reason,
            duration_seconds: results.duration_ms / 1000,
            played_at: current_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::persistence::{InMemoryMatchStore, RecordingPushNotifier};
    use crate::question::{QuestionSelector, StaticQuestionSource};
    use crate::rating::InMemoryRatingStore;
    use crate::registry::{PlayerRegistry, Registration, RegistryConfig};
    use crate::types::{Difficulty, OnlinePlayer};
    use std::time::Duration;

    struct Harness {
        driver: Arc<GameDriver>,
        events: Arc<RecordingEventSink>,
        match_store: Arc<InMemoryMatchStore>,
        rating_store: Arc<InMemoryRatingStore>,
        notifier: Arc<RecordingPushNotifier>,
        registry: Arc<PlayerRegistry>,
    }

    fn harness(settings: GameSettings) -> Harness {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        let rooms = Arc::new(GameRoomManager::new(selector, settings.clone()));
        let registry = Arc::new(PlayerRegistry::new(RegistryConfig::default()));
        let events = Arc::new(RecordingEventSink::new());
        let match_store = Arc::new(InMemoryMatchStore::new());
        let rating_store = Arc::new(InMemoryRatingStore::new());
        let notifier = Arc::new(RecordingPushNotifier::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());

        let driver = Arc::new(GameDriver::new(
            rooms,
            registry.clone(),
            events.clone(),
            match_store.clone(),
            rating_store.clone(),
            notifier.clone(),
            metrics,
            settings,
        ));

        Harness {
            driver,
            events,
            match_store,
            rating_store,
            notifier,
            registry,
        }
    }

    fn online_player(registry: &PlayerRegistry, id: &str, rating: i32) -> OnlinePlayer {
        registry
            .register(
                format!("conn-{}", id),
                Registration {
                    player_id: id.to_string(),
                    username: format!("user-{}", id),
                    rating,
                    difficulty: Difficulty::Medium,
                    time_limit_seconds: 60,
                    tags: vec![],
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_room_issues_first_question_to_both() {
        let h = harness(GameSettings::default());
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        let (room_id, _) = h.driver.rooms().create_room([a, b]).unwrap();

        h.driver.start_room(&room_id).await.unwrap();

        assert_eq!(h.events.count_kind_for("a", "game-started"), 1);
        assert_eq!(h.events.count_kind_for("b", "game-started"), 1);
    }

    #[tokio::test]
    async fn test_finish_room_persists_and_applies_deltas() {
        let h = harness(GameSettings::default());
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        h.rating_store.seed("a", Difficulty::Medium, 1000);
        h.rating_store.seed("b", Difficulty::Medium, 1040);
        h.registry.set_in_game(&"a".to_string(), true).unwrap();
        h.registry.set_in_game(&"b".to_string(), true).unwrap();

        let (room_id, room) = h.driver.rooms().create_room([a, b]).unwrap();
        {
            let mut room = room.lock().unwrap();
            room.start().unwrap();
            let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
            room.submit_answer(&"a".to_string(), &q.answer, 100).unwrap();
        }

        let results = h
            .driver
            .finish_room(&room_id, EndReason::Normal, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(results.winner, "a");
        assert_eq!(h.match_store.records().len(), 1);
        assert_eq!(h.rating_store.rating_of("a", Difficulty::Medium), Some(1005));
        assert_eq!(h.rating_store.rating_of("b", Difficulty::Medium), Some(1035));
        assert_eq!(h.events.count_kind("game-ended"), 2);

        // Busy flags cleared, room gone
        assert!(!h
            .registry
            .player_by_id(&"a".to_string())
            .unwrap()
            .unwrap()
            .in_game);
        assert!(h.driver.rooms().room(&room_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_room_is_exactly_once() {
        let h = harness(GameSettings::default());
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        let (room_id, room) = h.driver.rooms().create_room([a, b]).unwrap();
        room.lock().unwrap().start().unwrap();

        let first = h
            .driver
            .finish_room(&room_id, EndReason::Normal, None)
            .await
            .unwrap();
        let second = h
            .driver
            .finish_room(&room_id, EndReason::Normal, None)
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(h.match_store.records().len(), 1);
        assert_eq!(h.events.count_kind("game-ended"), 2);
    }

    #[tokio::test]
    async fn test_finish_by_disconnect_notifies_remaining_player() {
        let h = harness(GameSettings::default());
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        h.rating_store.seed("a", Difficulty::Medium, 1000);
        h.rating_store.seed("b", Difficulty::Medium, 1040);
        let (room_id, room) = h.driver.rooms().create_room([a, b]).unwrap();
        room.lock().unwrap().start().unwrap();

        let results = h
            .driver
            .finish_room(&room_id, EndReason::OpponentDisconnect, Some("a".to_string()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(results.winner, "b");
        assert_eq!(results.end_reason, EndReason::OpponentDisconnect);
        assert_eq!(h.rating_store.rating_of("a", Difficulty::Medium), Some(990));
        assert_eq!(h.rating_store.rating_of("b", Difficulty::Medium), Some(1045));

        // Push notification is fire-and-forget; give the task a beat
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pushes = h.notifier.pushes();
        assert!(pushes
            .iter()
            .any(|(id, kind)| id == "b" && kind == "opponent-disconnected"));
    }

    #[tokio::test]
    async fn test_schedule_start_runs_after_delay() {
        let h = harness(GameSettings {
            start_delay: Duration::from_millis(20),
            ..GameSettings::default()
        });
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        let (room_id, _) = h.driver.rooms().create_room([a, b]).unwrap();

        h.driver.clone().schedule_start(room_id);
        assert_eq!(h.events.count_kind("game-started"), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(h.events.count_kind("game-started"), 2);
    }

    #[tokio::test]
    async fn test_duration_timer_ends_the_game() {
        let h = harness(GameSettings {
            start_delay: Duration::from_millis(5),
            game_duration: Duration::from_millis(30),
            ..GameSettings::default()
        });
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        let (room_id, _) = h.driver.rooms().create_room([a, b]).unwrap();

        h.driver.clone().schedule_start(room_id.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.events.count_kind("game-ended"), 2);
        assert!(h.driver.rooms().room(&room_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_stale_force_ends_old_rooms() {
        let h = harness(GameSettings {
            stale_room_ceiling: Duration::from_millis(0),
            ..GameSettings::default()
        });
        let a = online_player(&h.registry, "a", 1000);
        let b = online_player(&h.registry, "b", 1040);
        let (room_id, _) = h.driver.rooms().create_room([a, b]).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reaped = h.driver.sweep_stale().await.unwrap();

        assert_eq!(reaped, 1);
        assert!(h.driver.rooms().room(&room_id).unwrap().is_none());
        let ended: Vec<_> = h.events.events_for("a");
        assert!(ended.iter().any(|e| matches!(
            e,
            OutboundEvent::GameEnded {
                reason: EndReason::Stale,
                ..
            }
        )));
    }
}
