//! Per-connection inbound operations
//!
//! One method per inbound event: register-player, join-queue, cancel-search,
//! submit-answer, request-current-state, disconnect. The transport layer
//! (out of scope) maps its messages onto these calls and reports failures
//! back as error events via `report_error`.

use crate::error::{ArenaError, Result};
use crate::events::{EventSink, OutboundEvent};
use crate::game::{GameDriver, GameRoom};
use crate::matchmaking::{EnqueueOutcome, MatchCoordinator};
use crate::metrics::MetricsCollector;
use crate::persistence::PlayerDirectory;
use crate::registry::{PlayerRegistry, Registration};
use crate::types::{ConnectionId, Difficulty, EndReason, OnlinePlayer, QueueStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Registration payload from a connecting client. Unset fields fall back to
/// the durable profile, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub player_id: String,
    pub username: Option<String>,
    pub rating: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub time_limit_seconds: Option<u32>,
    pub tags: Vec<String>,
}

/// The inbound operation surface, one instance per process
pub struct ArenaService {
    registry: Arc<PlayerRegistry>,
    coordinator: Arc<MatchCoordinator>,
    driver: Arc<GameDriver>,
    events: Arc<dyn EventSink>,
    directory: Arc<dyn PlayerDirectory>,
    metrics: Arc<MetricsCollector>,
}

impl ArenaService {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        coordinator: Arc<MatchCoordinator>,
        driver: Arc<GameDriver>,
        events: Arc<dyn EventSink>,
        directory: Arc<dyn PlayerDirectory>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            driver,
            events,
            directory,
            metrics,
        }
    }

    pub fn registry(&self) -> Arc<PlayerRegistry> {
        self.registry.clone()
    }

    pub fn coordinator(&self) -> Arc<MatchCoordinator> {
        self.coordinator.clone()
    }

    pub fn driver(&self) -> Arc<GameDriver> {
        self.driver.clone()
    }

    fn lock_room<'a>(
        room: &'a Arc<Mutex<GameRoom>>,
    ) -> Result<MutexGuard<'a, GameRoom>> {
        room.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire room lock".to_string(),
            }
            .into()
        })
    }

    /// Register (or re-register) the player behind a connection.
    pub async fn register_player(
        &self,
        connection: &ConnectionId,
        request: RegisterRequest,
    ) -> Result<OnlinePlayer> {
        let profile = self.directory.profile(&request.player_id).await?;

        let registration = Registration {
            player_id: request.player_id.clone(),
            username: request
                .username
                .or_else(|| profile.as_ref().map(|p| p.username.clone()))
                .unwrap_or_else(|| request.player_id.clone()),
            rating: request
                .rating
                .or_else(|| profile.as_ref().map(|p| p.rating))
                .unwrap_or(1200),
            difficulty: request
                .difficulty
                .or_else(|| profile.as_ref().map(|p| p.preferred_difficulty))
                .unwrap_or(Difficulty::Medium),
            time_limit_seconds: request
                .time_limit_seconds
                .or_else(|| profile.as_ref().map(|p| p.preferred_time_limit_seconds))
                .unwrap_or(60),
            tags: request.tags,
        };

        let player = self.registry.register(connection.clone(), registration)?;
        self.metrics
            .service()
            .players_online
            .set(self.registry.online_count()? as i64);

        self.events
            .send(
                &player.id,
                OutboundEvent::PlayerRegistered {
                    player: player.brief(),
                },
            )
            .await?;
        Ok(player)
    }

    /// Enter matchmaking. Emits lobby-joined when the player ends up
    /// waiting; an immediate match skips straight to match-found.
    pub async fn join_queue(&self, connection: &ConnectionId) -> Result<EnqueueOutcome> {
        let player = self.player_for(connection)?;
        self.registry.touch(connection)?;

        let outcome = self.coordinator.clone().enqueue(player.clone()).await?;
        if outcome == EnqueueOutcome::Queued {
            self.events
                .send(
                    &player.id,
                    OutboundEvent::LobbyJoined {
                        player: player.brief(),
                    },
                )
                .await?;
        }
        Ok(outcome)
    }

    /// Cancel a live search. A no-op (without event) when nothing was queued.
    pub async fn cancel_search(&self, connection: &ConnectionId) -> Result<bool> {
        let player = self.player_for(connection)?;
        let removed = self.coordinator.cancel(&player.id).await?;
        if removed {
            info!("{} cancelled search", player.id);
            self.events
                .send(&player.id, OutboundEvent::SearchCancelled)
                .await?;
        }
        Ok(removed)
    }

    /// Record an answer, update the opponent, and issue the next question.
    /// Once both players exhaust the question count the match ends normally.
    pub async fn submit_answer(
        &self,
        connection: &ConnectionId,
        answer: &str,
        time_spent_ms: u64,
    ) -> Result<()> {
        let player = self.player_for(connection)?;
        self.registry.touch(connection)?;

        let room_arc = self
            .driver
            .rooms()
            .room_for(&player.id)?
            .ok_or_else(|| ArenaError::RoomNotFound {
                room_id: format!("player:{}", player.id),
            })?;

        let (room_id, outcome, opponent_id) = {
            let mut room = Self::lock_room(&room_arc)?;
            let outcome = room.submit_answer(&player.id, answer, time_spent_ms)?;
            let opponent_id = room.opponent_of(&player.id).map(|p| p.id.clone());
            (room.id().clone(), outcome, opponent_id)
        };
        self.metrics.record_answer(outcome.correct);
        debug!(
            "Answer from {} at index {}: {}",
            player.id,
            outcome.question_index,
            if outcome.correct { "correct" } else { "incorrect" }
        );

        if let Some(opponent_id) = &opponent_id {
            self.events
                .send(
                    opponent_id,
                    OutboundEvent::OpponentScoreUpdate {
                        opponent_id: player.id.clone(),
                        score: outcome.score.score,
                        correct_answers: outcome.score.correct_answers,
                    },
                )
                .await?;
        }

        let next = {
            let mut room = Self::lock_room(&room_arc)?;
            match room.next_question(&player.id)? {
                Some((index, question)) => {
                    Some((index, question, room.snapshot(), room.question_meter()))
                }
                None => {
                    if room.both_finished() {
                        None
                    } else {
                        // This player is done; the opponent is still playing
                        return Ok(());
                    }
                }
            }
        };

        match next {
            Some((index, question, snapshot, meter)) => {
                self.metrics.game().questions_served_total.inc();
                self.events
                    .send(
                        &player.id,
                        OutboundEvent::NextQuestion {
                            question,
                            question_index: index,
                            state: snapshot,
                            question_meter: meter,
                        },
                    )
                    .await?;
            }
            None => {
                self.driver
                    .finish_room(&room_id, EndReason::Normal, None)
                    .await?;
            }
        }

        Ok(())
    }

    /// Push the current room state back to the requesting player.
    pub async fn current_state(&self, connection: &ConnectionId) -> Result<()> {
        let player = self.player_for(connection)?;
        let room_arc = self
            .driver
            .rooms()
            .room_for(&player.id)?
            .ok_or_else(|| ArenaError::RoomNotFound {
                room_id: format!("player:{}", player.id),
            })?;

        let (snapshot, current_question) = {
            let room = Self::lock_room(&room_arc)?;
            (
                room.snapshot(),
                room.current_question(&player.id).map(|(_, q)| q),
            )
        };

        self.events
            .send(
                &player.id,
                OutboundEvent::GameStateUpdate {
                    state: snapshot,
                    current_question,
                },
            )
            .await?;
        Ok(())
    }

    /// Queue status for the requesting player (debug/status surface).
    pub async fn queue_status(&self, connection: &ConnectionId) -> Result<QueueStatus> {
        let player = self.player_for(connection)?;
        let status = self.coordinator.queue_status()?;
        self.events
            .send(&player.id, OutboundEvent::QueueStatus(status.clone()))
            .await?;
        Ok(status)
    }

    /// Handle a dropped connection: leave the queue, forfeit any live match,
    /// and start the reconnection grace window.
    pub async fn disconnect(&self, connection: &ConnectionId) -> Result<()> {
        let Some(player) = self.registry.player_by_connection(connection)? else {
            return Ok(());
        };
        info!("Handling disconnect for {}", player.id);

        self.coordinator.on_disconnect(&player.id).await?;

        if let Some(room_arc) = self.driver.rooms().room_for(&player.id)? {
            let room_id = Self::lock_room(&room_arc)?.id().clone();
            self.driver
                .finish_room(&room_id, EndReason::OpponentDisconnect, Some(player.id.clone()))
                .await?;
        }

        self.registry.disconnect(connection)?;
        self.metrics
            .service()
            .players_online
            .set(self.registry.online_count()? as i64);
        Ok(())
    }

    /// Surface an operation failure to the client as an error event.
    pub async fn report_error(&self, connection: &ConnectionId, error: &anyhow::Error) {
        let Ok(Some(player)) = self.registry.player_by_connection(connection) else {
            warn!("Error on unknown connection {}: {}", connection, error);
            return;
        };
        let _ = self
            .events
            .send(
                &player.id,
                OutboundEvent::Error {
                    message: error.to_string(),
                },
            )
            .await;
    }

    fn player_for(&self, connection: &ConnectionId) -> Result<OnlinePlayer> {
        self.registry
            .player_by_connection(connection)?
            .ok_or_else(|| {
                ArenaError::PlayerNotFound {
                    player_id: connection.clone(),
                }
                .into()
            })
    }
}
