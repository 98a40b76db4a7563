//! Configuration management for the quiz-arena service
//!
//! This module handles all configuration loading from environment variables,
//! TOML files and CLI overrides, with validation and default values.

pub mod app;

pub use app::{
    validate_config, AppConfig, GameConfig, MatchmakingConfig, ServiceSettings, StoreSettings,
};
