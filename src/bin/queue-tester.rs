//! Queue Tester CLI Tool
//!
//! Command-line tool for exercising the matchmaking queue and match
//! lifecycle against an in-process service with the in-memory store.
//!
//! Usage:
//!   cargo run --bin queue-tester -- run-scenario --scenario instant-pair
//!   cargo run --bin queue-tester -- run-scenario --scenario expansion
//!   cargo run --bin queue-tester -- run-scenario --scenario full-match
//!   cargo run --bin queue-tester -- run-all-scenarios
//!   cargo run --bin queue-tester -- pool-stats

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use quiz_arena::config::AppConfig;
use quiz_arena::events::RecordingEventSink;
use quiz_arena::game::{GameDriver, GameRoomManager, GameSettings};
use quiz_arena::matchmaking::{CoordinatorConfig, EnqueueOutcome, MatchCoordinator};
use quiz_arena::metrics::MetricsCollector;
use quiz_arena::persistence::{
    InMemoryMatchStore, InMemoryPlayerDirectory, RecordingPushNotifier,
};
use quiz_arena::question::{QuestionSelector, StaticQuestionSource};
use quiz_arena::rating::InMemoryRatingStore;
use quiz_arena::registry::{PlayerRegistry, RegistryConfig};
use quiz_arena::service::{ArenaService, RegisterRequest};
use quiz_arena::types::Difficulty;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "queue-tester")]
#[command(about = "Exercise quiz-arena matchmaking scenarios in-process")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a predefined test scenario
    RunScenario {
        /// Scenario name (instant-pair, expansion, cancel, full-match, disconnect)
        #[arg(short, long)]
        scenario: String,
    },
    /// Run every scenario in sequence
    RunAllScenarios,
    /// Show question pool statistics
    PoolStats,
    /// Validate the default configuration
    CheckConfig,
}

struct TestRig {
    service: Arc<ArenaService>,
    events: Arc<RecordingEventSink>,
    match_store: Arc<InMemoryMatchStore>,
}

impl TestRig {
    fn new(coordinator_config: CoordinatorConfig, game_settings: GameSettings) -> Result<Self> {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new())?);
        let registry = Arc::new(PlayerRegistry::new(RegistryConfig::default()));
        let events = Arc::new(RecordingEventSink::new());
        let match_store = Arc::new(InMemoryMatchStore::new());
        let metrics = Arc::new(MetricsCollector::new()?);
        let notifier = Arc::new(RecordingPushNotifier::new());

        let rooms = Arc::new(GameRoomManager::new(selector, game_settings.clone()));
        let driver = Arc::new(GameDriver::new(
            rooms,
            registry.clone(),
            events.clone(),
            match_store.clone(),
            Arc::new(InMemoryRatingStore::new()),
            notifier.clone(),
            metrics.clone(),
            game_settings,
        ));
        let coordinator = Arc::new(MatchCoordinator::new(
            Arc::new(quiz_arena::store::InMemoryQueueStore::new()),
            registry.clone(),
            driver.clone(),
            events.clone(),
            notifier,
            metrics.clone(),
            coordinator_config,
        ));
        let service = Arc::new(ArenaService::new(
            registry,
            coordinator,
            driver,
            events.clone(),
            Arc::new(InMemoryPlayerDirectory::new()),
            metrics,
        ));

        Ok(Self {
            service,
            events,
            match_store,
        })
    }

    async fn register(&self, id: &str, rating: i32) -> Result<()> {
        self.service
            .register_player(
                &format!("conn-{}", id),
                RegisterRequest {
                    player_id: id.to_string(),
                    username: Some(format!("user-{}", id)),
                    rating: Some(rating),
                    difficulty: Some(Difficulty::Medium),
                    time_limit_seconds: Some(60),
                    tags: vec![],
                },
            )
            .await?;
        Ok(())
    }
}

async fn scenario_instant_pair() -> Result<()> {
    println!("=== instant-pair: two close ratings pair on the immediate path ===");
    let rig = TestRig::new(CoordinatorConfig::default(), GameSettings::default())?;

    rig.register("alice", 1000).await?;
    rig.register("bob", 1040).await?;

    let first = rig.service.join_queue(&"conn-alice".to_string()).await?;
    println!("alice -> {:?}", first);
    let second = rig.service.join_queue(&"conn-bob".to_string()).await?;
    println!("bob   -> {:?}", second);

    if !matches!(second, EnqueueOutcome::Matched(_)) {
        return Err(anyhow!("expected bob to match immediately"));
    }
    println!(
        "match-found events: {} (expected 2)",
        rig.events.count_kind("match-found")
    );
    Ok(())
}

async fn scenario_expansion() -> Result<()> {
    println!("=== expansion: adjacent-bucket opponent pairs after the short delay ===");
    let rig = TestRig::new(
        CoordinatorConfig {
            first_expansion_delay: Duration::from_millis(50),
            full_expansion_delay: Duration::from_millis(200),
            ..CoordinatorConfig::default()
        },
        GameSettings::default(),
    )?;

    // 1150 and 1250 sit in different buckets (800..1200 vs 1200..1600)
    rig.register("alice", 1150).await?;
    rig.register("bob", 1250).await?;

    let first = rig.service.join_queue(&"conn-alice".to_string()).await?;
    let second = rig.service.join_queue(&"conn-bob".to_string()).await?;
    println!("alice -> {:?}, bob -> {:?}", first, second);
    if first != EnqueueOutcome::Queued || second != EnqueueOutcome::Queued {
        return Err(anyhow!("expected both players to queue"));
    }

    tokio::time::sleep(Duration::from_millis(120)).await;
    let matched = rig.events.count_kind("match-found");
    println!("match-found events after expansion window: {}", matched);
    if matched != 2 {
        return Err(anyhow!("expected the first expansion to pair them"));
    }
    Ok(())
}

async fn scenario_cancel() -> Result<()> {
    println!("=== cancel: cancellation removes the queue entry idempotently ===");
    let rig = TestRig::new(CoordinatorConfig::default(), GameSettings::default())?;

    rig.register("alice", 1000).await?;
    rig.service.join_queue(&"conn-alice".to_string()).await?;

    let removed = rig.service.cancel_search(&"conn-alice".to_string()).await?;
    let again = rig.service.cancel_search(&"conn-alice".to_string()).await?;
    println!("first cancel removed: {}, second: {}", removed, again);
    if !removed || again {
        return Err(anyhow!("cancel should remove once and then no-op"));
    }
    Ok(())
}

async fn scenario_full_match() -> Result<()> {
    println!("=== full-match: play both sides through to a normal finish ===");
    let rig = TestRig::new(
        CoordinatorConfig::default(),
        GameSettings {
            questions_per_game: 3,
            start_delay: Duration::from_millis(20),
            ..GameSettings::default()
        },
    )?;

    rig.register("alice", 1000).await?;
    rig.register("bob", 1040).await?;
    rig.service.join_queue(&"conn-alice".to_string()).await?;
    rig.service.join_queue(&"conn-bob".to_string()).await?;

    tokio::time::sleep(Duration::from_millis(80)).await;

    // Answer everything wrong from bob, right from alice, via game state
    for _ in 0..3 {
        for (conn, answer_right) in [("conn-alice", true), ("conn-bob", false)] {
            let conn = conn.to_string();
            rig.service.current_state(&conn).await?;
            let question = rig
                .events
                .events_for(conn.trim_start_matches("conn-"))
                .into_iter()
                .rev()
                .find_map(|e| match e {
                    quiz_arena::events::OutboundEvent::GameStateUpdate {
                        current_question, ..
                    } => current_question,
                    _ => None,
                })
                .ok_or_else(|| anyhow!("no current question for {}", conn))?;
            let answer = if answer_right {
                question.answer.clone()
            } else {
                "wrong".to_string()
            };
            rig.service.submit_answer(&conn, &answer, 500).await?;
        }
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    let records = rig.match_store.records();
    println!(
        "persisted records: {}, game-ended events: {}",
        records.len(),
        rig.events.count_kind("game-ended")
    );
    match records.first() {
        Some(record) if record.winner.as_deref() == Some("alice") => Ok(()),
        Some(record) => Err(anyhow!("unexpected winner: {:?}", record.winner)),
        None => Err(anyhow!("match was not persisted")),
    }
}

async fn scenario_disconnect() -> Result<()> {
    println!("=== disconnect: leaver forfeits with the asymmetric penalty ===");
    let rig = TestRig::new(
        CoordinatorConfig::default(),
        GameSettings {
            start_delay: Duration::from_millis(10),
            ..GameSettings::default()
        },
    )?;

    rig.register("alice", 1000).await?;
    rig.register("bob", 1040).await?;
    rig.service.join_queue(&"conn-alice".to_string()).await?;
    rig.service.join_queue(&"conn-bob".to_string()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    rig.service.disconnect(&"conn-alice".to_string()).await?;

    let records = rig.match_store.records();
    let record = records
        .first()
        .ok_or_else(|| anyhow!("disconnect finish was not persisted"))?;
    println!(
        "winner: {:?}, reason: {}",
        record.winner, record.end_reason
    );
    if record.winner.as_deref() != Some("bob") {
        return Err(anyhow!("remaining player should win by disconnect"));
    }
    Ok(())
}

async fn run_scenario(name: &str) -> Result<()> {
    match name {
        "instant-pair" => scenario_instant_pair().await,
        "expansion" => scenario_expansion().await,
        "cancel" => scenario_cancel().await,
        "full-match" => scenario_full_match().await,
        "disconnect" => scenario_disconnect().await,
        other => Err(anyhow!(
            "unknown scenario '{}' (expected instant-pair, expansion, cancel, full-match, disconnect)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario { scenario } => {
            run_scenario(&scenario).await?;
            println!("scenario '{}' passed", scenario);
        }
        Commands::RunAllScenarios => {
            for scenario in ["instant-pair", "expansion", "cancel", "full-match", "disconnect"] {
                run_scenario(scenario).await?;
                println!("scenario '{}' passed\n", scenario);
            }
            println!("all scenarios passed");
        }
        Commands::PoolStats => {
            let selector = QuestionSelector::new(&StaticQuestionSource::new())?;
            let stats = selector.statistics();
            println!("questions loaded: {}", stats.total_loaded);
            println!("(difficulty, level) keys: {}", stats.primary_keys);
            for (difficulty, count) in &stats.by_difficulty {
                println!("  {}: {}", difficulty, count);
            }
        }
        Commands::CheckConfig => {
            let config = AppConfig::from_env()?;
            println!("configuration valid: service '{}'", config.service.name);
        }
    }

    Ok(())
}
