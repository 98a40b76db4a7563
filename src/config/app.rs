//! Main application configuration
//!
//! Configuration layers: built-in defaults, then environment variables, then
//! an optional TOML file, then CLI overrides applied in `main`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    #[serde(default)]
    pub game: GameConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health/metrics endpoints
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Shared queue store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Redis URL for the shared queue store
    pub redis_url: String,
    /// Run with the process-local store instead of Redis (single-process
    /// deployments and testing)
    pub in_memory: bool,
}

/// Matchmaking policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingConfig {
    /// Queue ticket TTL in seconds
    pub ticket_ttl_seconds: u64,
    /// Delay before widening the search to adjacent buckets, milliseconds
    pub first_expansion_delay_ms: u64,
    /// Delay (from enqueue) before widening to all buckets, milliseconds
    pub full_expansion_delay_ms: u64,
    /// Interval of the expired-entry queue sweep, seconds
    pub queue_sweep_interval_seconds: u64,
}

/// Match lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Questions each player plays through
    pub questions_per_game: u32,
    /// Total wall-clock seconds a match may run once started
    pub game_duration_seconds: u64,
    /// Delay between match-found and game start, seconds
    pub start_delay_seconds: u64,
    /// Age at which a room is force-ended regardless of state, seconds
    pub stale_room_ceiling_seconds: u64,
    /// Interval of the stale-room sweep, seconds
    pub room_sweep_interval_seconds: u64,
    /// Reconnection grace period before a disconnected identity is dropped,
    /// seconds
    pub reconnect_grace_seconds: u64,
    /// Idle registration lifetime, seconds
    pub inactivity_timeout_seconds: u64,
    /// Optional path to a JSON question pool; the built-in pool is used
    /// when unset
    pub question_pool_path: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "quiz-arena".to_string(),
            log_level: "info".to_string(),
            metrics_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            in_memory: false,
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            ticket_ttl_seconds: 180,
            first_expansion_delay_ms: 2000,
            full_expansion_delay_ms: 8000,
            queue_sweep_interval_seconds: 30,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            questions_per_game: 10,
            game_duration_seconds: 60,
            start_delay_seconds: 3,
            stale_room_ceiling_seconds: 1800,
            room_sweep_interval_seconds: 60,
            reconnect_grace_seconds: 5,
            inactivity_timeout_seconds: 600,
            question_pool_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            config.service.metrics_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid METRICS_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        if let Ok(url) = env::var("REDIS_URL") {
            config.store.redis_url = url;
        }
        if let Ok(in_memory) = env::var("STORE_IN_MEMORY") {
            config.store.in_memory = in_memory
                .parse()
                .map_err(|_| anyhow!("Invalid STORE_IN_MEMORY value: {}", in_memory))?;
        }

        if let Ok(ttl) = env::var("TICKET_TTL_SECONDS") {
            config.matchmaking.ticket_ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid TICKET_TTL_SECONDS value: {}", ttl))?;
        }
        if let Ok(delay) = env::var("FIRST_EXPANSION_DELAY_MS") {
            config.matchmaking.first_expansion_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid FIRST_EXPANSION_DELAY_MS value: {}", delay))?;
        }
        if let Ok(delay) = env::var("FULL_EXPANSION_DELAY_MS") {
            config.matchmaking.full_expansion_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid FULL_EXPANSION_DELAY_MS value: {}", delay))?;
        }
        if let Ok(interval) = env::var("QUEUE_SWEEP_INTERVAL_SECONDS") {
            config.matchmaking.queue_sweep_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_SWEEP_INTERVAL_SECONDS value: {}", interval))?;
        }

        if let Ok(count) = env::var("QUESTIONS_PER_GAME") {
            config.game.questions_per_game = count
                .parse()
                .map_err(|_| anyhow!("Invalid QUESTIONS_PER_GAME value: {}", count))?;
        }
        if let Ok(duration) = env::var("GAME_DURATION_SECONDS") {
            config.game.game_duration_seconds = duration
                .parse()
                .map_err(|_| anyhow!("Invalid GAME_DURATION_SECONDS value: {}", duration))?;
        }
        if let Ok(ceiling) = env::var("STALE_ROOM_CEILING_SECONDS") {
            config.game.stale_room_ceiling_seconds = ceiling
                .parse()
                .map_err(|_| anyhow!("Invalid STALE_ROOM_CEILING_SECONDS value: {}", ceiling))?;
        }
        if let Ok(grace) = env::var("RECONNECT_GRACE_SECONDS") {
            config.game.reconnect_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid RECONNECT_GRACE_SECONDS value: {}", grace))?;
        }
        if let Ok(path) = env::var("QUESTION_POOL_PATH") {
            config.game.question_pool_path = Some(path);
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.matchmaking.ticket_ttl_seconds)
    }

    pub fn first_expansion_delay(&self) -> Duration {
        Duration::from_millis(self.matchmaking.first_expansion_delay_ms)
    }

    pub fn full_expansion_delay(&self) -> Duration {
        Duration::from_millis(self.matchmaking.full_expansion_delay_ms)
    }

    pub fn queue_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.queue_sweep_interval_seconds)
    }

    pub fn game_duration(&self) -> Duration {
        Duration::from_secs(self.game.game_duration_seconds)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.game.start_delay_seconds)
    }

    pub fn stale_room_ceiling(&self) -> Duration {
        Duration::from_secs(self.game.stale_room_ceiling_seconds)
    }

    pub fn room_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.game.room_sweep_interval_seconds)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.game.reconnect_grace_seconds)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.game.inactivity_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if !config.store.in_memory && config.store.redis_url.is_empty() {
        return Err(anyhow!("Redis URL cannot be empty"));
    }

    if config.matchmaking.ticket_ttl_seconds == 0 {
        return Err(anyhow!("Ticket TTL must be greater than 0"));
    }
    if config.matchmaking.full_expansion_delay_ms < config.matchmaking.first_expansion_delay_ms {
        return Err(anyhow!(
            "Full expansion delay must not be shorter than the first expansion delay"
        ));
    }

    if config.game.questions_per_game == 0 {
        return Err(anyhow!("Questions per game must be greater than 0"));
    }
    if config.game.game_duration_seconds == 0 {
        return Err(anyhow!("Game duration must be greater than 0"));
    }
    if config.game.stale_room_ceiling_seconds == 0 {
        return Err(anyhow!("Stale room ceiling must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.game.questions_per_game, 10);
        assert_eq!(config.matchmaking.ticket_ttl_seconds, 180);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_expansion_delay_ordering_enforced() {
        let mut config = AppConfig::default();
        config.matchmaking.first_expansion_delay_ms = 5000;
        config.matchmaking.full_expansion_delay_ms = 1000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.service.name, "quiz-arena");
        assert_eq!(parsed.store.redis_url, config.store.redis_url);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [service]
            name = "arena-test"
            log_level = "debug"
            metrics_port = 9999
            shutdown_timeout_seconds = 10
            "#,
        )
        .unwrap();
        assert_eq!(parsed.service.name, "arena-test");
        assert_eq!(parsed.game.questions_per_game, 10);
    }
}
