//! Main application state and service coordination
//!
//! `AppState` builds every component from configuration, starts the
//! background maintenance tasks (queue sweep, stale-room sweep, registry
//! reap, metrics updates) and handles graceful shutdown.
//!
//! The durable-profile, match-record and push collaborators default to their
//! in-memory implementations here; a deployment swaps in real backends
//! through the `with_collaborators` constructor.

use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{ChannelEventSink, EventSink};
use crate::game::{GameDriver, GameRoomManager, GameSettings};
use crate::matchmaking::{CoordinatorConfig, MatchCoordinator};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::persistence::{
    InMemoryMatchStore, InMemoryPlayerDirectory, MatchStore, PlayerDirectory, PushNotifier,
    RecordingPushNotifier,
};
use crate::question::{JsonFileSource, QuestionSelector, QuestionSource, StaticQuestionSource};
use crate::rating::{InMemoryRatingStore, RatingStore};
use crate::registry::{PlayerRegistry, RegistryConfig};
use crate::service::session::ArenaService;
use crate::store::{InMemoryQueueStore, QueueStore, RedisQueueStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// External collaborator handles, swappable at deployment
pub struct Collaborators {
    pub directory: Arc<dyn PlayerDirectory>,
    pub match_store: Arc<dyn MatchStore>,
    pub rating_store: Arc<dyn RatingStore>,
    pub notifier: Arc<dyn PushNotifier>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            directory: Arc::new(InMemoryPlayerDirectory::new()),
            match_store: Arc::new(InMemoryMatchStore::new()),
            rating_store: Arc::new(InMemoryRatingStore::new()),
            notifier: Arc::new(RecordingPushNotifier::new()),
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    registry: Arc<PlayerRegistry>,
    coordinator: Arc<MatchCoordinator>,
    driver: Arc<GameDriver>,
    service: Arc<ArenaService>,
    events: Arc<ChannelEventSink>,
    metrics: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
    background_tasks: Vec<JoinHandle<()>>,
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize with default (in-memory) collaborators.
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_collaborators(config, Collaborators::default()).await
    }

    /// Initialize the application with explicit collaborators.
    pub async fn with_collaborators(
        config: AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        info!("Initializing quiz-arena service: {}", config.service.name);

        let source: Box<dyn QuestionSource> = match &config.game.question_pool_path {
            Some(path) => Box::new(JsonFileSource::new(path)),
            None => Box::new(StaticQuestionSource::new()),
        };
        let selector = Arc::new(QuestionSelector::new(source.as_ref())?);
        let stats = selector.statistics();
        info!(
            "Question pool ready: {} questions, {} keys",
            stats.total_loaded, stats.primary_keys
        );

        let store: Arc<dyn QueueStore> = if config.store.in_memory {
            info!("Using in-memory queue store");
            Arc::new(InMemoryQueueStore::new())
        } else {
            info!("Using Redis queue store at {}", config.store.redis_url);
            Arc::new(RedisQueueStore::new(&config.store.redis_url)?)
        };

        let metrics = Arc::new(MetricsCollector::new()?);
        let events = Arc::new(ChannelEventSink::new());
        let events_dyn: Arc<dyn EventSink> = events.clone();

        let registry = Arc::new(PlayerRegistry::new(RegistryConfig {
            reconnect_grace: config.reconnect_grace(),
            inactivity_timeout: config.inactivity_timeout(),
        }));

        let game_settings = GameSettings {
            questions_per_game: config.game.questions_per_game,
            game_duration: config.game_duration(),
            start_delay: config.start_delay(),
            stale_room_ceiling: config.stale_room_ceiling(),
        };
        let rooms = Arc::new(GameRoomManager::new(selector, game_settings.clone()));

        let driver = Arc::new(GameDriver::new(
            rooms,
            registry.clone(),
            events_dyn.clone(),
            collaborators.match_store.clone(),
            collaborators.rating_store.clone(),
            collaborators.notifier.clone(),
            metrics.clone(),
            game_settings,
        ));

        let coordinator = Arc::new(MatchCoordinator::new(
            store,
            registry.clone(),
            driver.clone(),
            events_dyn.clone(),
            collaborators.notifier.clone(),
            metrics.clone(),
            CoordinatorConfig {
                ticket_ttl: config.ticket_ttl(),
                first_expansion_delay: config.first_expansion_delay(),
                full_expansion_delay: config.full_expansion_delay(),
            },
        ));

        let service = Arc::new(ArenaService::new(
            registry.clone(),
            coordinator.clone(),
            driver.clone(),
            events_dyn,
            collaborators.directory,
            metrics.clone(),
        ));

        let health_server = Arc::new(HealthServer::new(
            HealthServerConfig {
                port: config.service.metrics_port,
                host: "0.0.0.0".to_string(),
            },
            metrics.clone(),
            registry.clone(),
            driver.rooms(),
        ));

        Ok(Self {
            config,
            registry,
            coordinator,
            driver,
            service,
            events,
            metrics,
            health_server,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the health server and background maintenance tasks.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting quiz-arena service");
        *self.is_running.write().await = true;

        self.start_health_server();
        self.start_queue_sweep();
        self.start_room_sweep();
        self.start_registry_reap();
        self.start_metrics_update();

        info!("Quiz-arena service started");
        Ok(())
    }

    /// Perform graceful shutdown.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down quiz-arena service");
        *self.is_running.write().await = false;

        if let Err(e) = self.health_server.stop().await {
            warn!("Failed to stop health server: {}", e);
        }

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        let stats = self.driver.rooms().stats()?;
        info!(
            "Final stats - rooms created: {}, removed: {}, still active: {}",
            stats.rooms_created, stats.rooms_removed, stats.active_rooms
        );
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<ArenaService> {
        self.service.clone()
    }

    /// The channel sink the transport layer attaches per-connection
    /// receivers to.
    pub fn events(&self) -> Arc<ChannelEventSink> {
        self.events.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    fn start_health_server(&mut self) {
        let health_server = self.health_server.clone();
        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            }
        }));
    }

    fn start_queue_sweep(&mut self) {
        let coordinator = self.coordinator.clone();
        let interval = self.config.queue_sweep_interval();
        let is_running = self.is_running.clone();
        self.background_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it
            ticker.tick().await;
            while *is_running.read().await {
                ticker.tick().await;
                if let Err(e) = coordinator.sweep_expired().await {
                    warn!("Queue sweep failed: {}", e);
                }
            }
        }));
    }

    fn start_room_sweep(&mut self) {
        let driver = self.driver.clone();
        let interval = self.config.room_sweep_interval();
        let is_running = self.is_running.clone();
        self.background_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            while *is_running.read().await {
                ticker.tick().await;
                if let Err(e) = driver.sweep_stale().await {
                    warn!("Stale-room sweep failed: {}", e);
                }
            }
        }));
    }

    fn start_registry_reap(&mut self) {
        let registry = self.registry.clone();
        let grace = self.config.reconnect_grace();
        let is_running = self.is_running.clone();
        self.background_tasks.push(tokio::spawn(async move {
            // Reap at the grace-period cadence so departures are observed
            // promptly without busy-looping
            let mut ticker = tokio::time::interval(grace.max(std::time::Duration::from_secs(1)));
            ticker.tick().await;
            while *is_running.read().await {
                ticker.tick().await;
                match registry.reap() {
                    Ok(reaped) if !reaped.is_empty() => {
                        info!("Registry reap removed {} players", reaped.len())
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Registry reap failed: {}", e),
                }
            }
        }));
    }

    fn start_metrics_update(&mut self) {
        let registry = self.registry.clone();
        let rooms = self.driver.rooms();
        let metrics = self.metrics.clone();
        let is_running = self.is_running.clone();
        self.background_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
            let started = tokio::time::Instant::now();
            while *is_running.read().await {
                ticker.tick().await;
                metrics
                    .service()
                    .uptime_seconds
                    .set(started.elapsed().as_secs() as i64);
                if let Ok(count) = registry.online_count() {
                    metrics.service().players_online.set(count as i64);
                }
                if let Ok(count) = rooms.active_room_count() {
                    metrics.game().active_rooms.set(count as i64);
                }
                metrics.update_health_status(2);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.in_memory = true;
        // Port 0 is rejected by validation; pick an ephemeral-range port the
        // test never actually binds (start() is not called here)
        config.service.metrics_port = 18080;
        config
    }

    #[tokio::test]
    async fn test_app_state_builds_with_in_memory_store() {
        let app = AppState::new(test_config()).await.unwrap();
        assert!(!app.is_running().await);
        assert_eq!(app.config().service.name, "quiz-arena");
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut config = test_config();
        // Avoid colliding with other tests' health servers
        config.service.metrics_port = 18981;
        let mut app = AppState::new(config).await.unwrap();

        app.start().await.unwrap();
        assert!(app.is_running().await);

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
    }
}
