//! Test fixtures for integration testing
//!
//! Builds a complete in-process service over the in-memory queue store,
//! with recording collaborators for assertions.

use quiz_arena::events::RecordingEventSink;
use quiz_arena::game::{GameDriver, GameRoomManager, GameSettings};
use quiz_arena::matchmaking::{CoordinatorConfig, MatchCoordinator};
use quiz_arena::metrics::MetricsCollector;
use quiz_arena::persistence::{
    InMemoryMatchStore, InMemoryPlayerDirectory, PlayerProfile, RecordingPushNotifier,
};
use quiz_arena::question::{QuestionSelector, StaticQuestionSource};
use quiz_arena::rating::InMemoryRatingStore;
use quiz_arena::registry::{PlayerRegistry, RegistryConfig};
use quiz_arena::service::{ArenaService, RegisterRequest};
use quiz_arena::store::InMemoryQueueStore;
use quiz_arena::types::{Difficulty, OnlinePlayer};
use std::sync::Arc;
use std::time::Duration;

/// Fully wired in-process system under test
pub struct TestHarness {
    pub service: Arc<ArenaService>,
    pub coordinator: Arc<MatchCoordinator>,
    pub driver: Arc<GameDriver>,
    pub registry: Arc<PlayerRegistry>,
    pub store: Arc<InMemoryQueueStore>,
    pub events: Arc<RecordingEventSink>,
    pub match_store: Arc<InMemoryMatchStore>,
    pub rating_store: Arc<InMemoryRatingStore>,
    pub notifier: Arc<RecordingPushNotifier>,
    pub directory: Arc<InMemoryPlayerDirectory>,
}

impl TestHarness {
    pub fn new(coordinator_config: CoordinatorConfig, game_settings: GameSettings) -> Self {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        let registry = Arc::new(PlayerRegistry::new(RegistryConfig::default()));
        let store = Arc::new(InMemoryQueueStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let match_store = Arc::new(InMemoryMatchStore::new());
        let rating_store = Arc::new(InMemoryRatingStore::new());
        let notifier = Arc::new(RecordingPushNotifier::new());
        let directory = Arc::new(InMemoryPlayerDirectory::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());

        let rooms = Arc::new(GameRoomManager::new(selector, game_settings.clone()));
        let driver = Arc::new(GameDriver::new(
            rooms,
            registry.clone(),
            events.clone(),
            match_store.clone(),
            rating_store.clone(),
            notifier.clone(),
            metrics.clone(),
            game_settings,
        ));
        let coordinator = Arc::new(MatchCoordinator::new(
            store.clone(),
            registry.clone(),
            driver.clone(),
            events.clone(),
            notifier.clone(),
            metrics.clone(),
            coordinator_config,
        ));
        let service = Arc::new(ArenaService::new(
            registry.clone(),
            coordinator.clone(),
            driver.clone(),
            events.clone(),
            directory.clone(),
            metrics,
        ));

        Self {
            service,
            coordinator,
            driver,
            registry,
            store,
            events,
            match_store,
            rating_store,
            notifier,
            directory,
        }
    }

    /// Default policy but with delays short enough for tests
    pub fn fast() -> Self {
        Self::new(
            CoordinatorConfig {
                ticket_ttl: Duration::from_secs(30),
                first_expansion_delay: Duration::from_millis(50),
                full_expansion_delay: Duration::from_millis(150),
            },
            GameSettings {
                questions_per_game: 3,
                game_duration: Duration::from_secs(30),
                start_delay: Duration::from_millis(20),
                stale_room_ceiling: Duration::from_secs(1800),
            },
        )
    }

    pub fn conn(player_id: &str) -> String {
        format!("conn-{}", player_id)
    }

    /// Register a player with the given rating and default preferences.
    pub async fn register(&self, player_id: &str, rating: i32) -> OnlinePlayer {
        self.register_with(player_id, rating, Difficulty::Medium, 60).await
    }

    pub async fn register_with(
        &self,
        player_id: &str,
        rating: i32,
        difficulty: Difficulty,
        time_limit_seconds: u32,
    ) -> OnlinePlayer {
        self.rating_store.seed(player_id, difficulty, rating);
        self.service
            .register_player(
                &Self::conn(player_id),
                RegisterRequest {
                    player_id: player_id.to_string(),
                    username: Some(format!("user-{}", player_id)),
                    rating: Some(rating),
                    difficulty: Some(difficulty),
                    time_limit_seconds: Some(time_limit_seconds),
                    tags: vec![],
                },
            )
            .await
            .unwrap()
    }

    /// Seed a durable profile for registration-fallback tests.
    pub fn seed_profile(&self, player_id: &str, rating: i32) {
        self.directory.insert(PlayerProfile {
            player_id: player_id.to_string(),
            username: format!("durable-{}", player_id),
            rating,
            preferred_difficulty: Difficulty::Hard,
            preferred_time_limit_seconds: 90,
        });
    }

    /// Total queue entries for one player across every bucket key.
    pub async fn queue_entries_for(&self, player_id: &str) -> usize {
        use quiz_arena::store::QueueStore;
        let mut count = 0;
        for key in self.store.queue_keys().await.unwrap() {
            count += self
                .store
                .waiting_entries(&key)
                .await
                .unwrap()
                .iter()
                .filter(|(id, _)| id == player_id)
                .count();
        }
        count
    }
}
