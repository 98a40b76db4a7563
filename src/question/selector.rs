//! Question level resolution and pool selection

use crate::error::{ArenaError, Result};
use crate::question::source::QuestionSource;
use crate::types::{Difficulty, Question};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Statistics about the loaded pool and its caches
#[derive(Debug, Clone, Default)]
pub struct PoolStatistics {
    pub total_loaded: usize,
    pub primary_keys: usize,
    pub tag_cache_entries: usize,
    pub by_difficulty: HashMap<String, usize>,
}

/// Holds the preloaded, indexed question pool and resolves draw requests.
///
/// The primary index is keyed by (difficulty, level); tag-filtered sub-pools
/// are memoized on first use so repeated draws for the same preference set
/// skip the filtering pass.
#[derive(Debug)]
pub struct QuestionSelector {
    pools: HashMap<(Difficulty, u8), Vec<Question>>,
    tag_pools: Mutex<HashMap<String, Vec<Question>>>,
    total_loaded: usize,
}

impl QuestionSelector {
    /// Load and index the pool from a source. Called once at startup.
    pub fn new(source: &dyn QuestionSource) -> Result<Self> {
        let data = source.load()?;
        let total_loaded = data.len();

        let mut pools: HashMap<(Difficulty, u8), Vec<Question>> = HashMap::new();
        for question in data {
            pools
                .entry((question.difficulty, question.level))
                .or_default()
                .push(question);
        }

        info!(
            "Loaded {} questions across {} (difficulty, level) keys",
            total_loaded,
            pools.len()
        );

        Ok(Self {
            pools,
            tag_pools: Mutex::new(HashMap::new()),
            total_loaded,
        })
    }

    /// Map a question meter value to a level 1–10.
    pub fn level_from_meter(meter: u32) -> u8 {
        const METER_RANGES: [(u8, u32, u32); 10] = [
            (1, 0, 5),
            (2, 6, 9),
            (3, 10, 13),
            (4, 14, 17),
            (5, 18, 21),
            (6, 22, 25),
            (7, 26, 29),
            (8, 30, 33),
            (9, 34, 37),
            (10, 38, 45),
        ];

        for (level, start, end) in METER_RANGES {
            if meter >= start && meter <= end {
                return level;
            }
        }
        10
    }

    /// Static rating heuristic, used only before any meter value exists.
    pub fn level_for_rating(rating: i32, difficulty: Difficulty) -> u8 {
        if rating < 800 {
            1
        } else if rating < 1200 {
            2
        } else if rating < 1600 {
            if difficulty == Difficulty::Easy {
                2
            } else {
                3
            }
        } else if rating < 2000 {
            if difficulty == Difficulty::Hard {
                4
            } else {
                3
            }
        } else {
            match difficulty {
                Difficulty::Medium => 4,
                Difficulty::Hard => 5,
                Difficulty::Easy => 3,
            }
        }
    }

    /// Resolve the target level. A supplied meter takes precedence over the
    /// static heuristic.
    pub fn resolve_level(rating: i32, difficulty: Difficulty, meter: Option<u32>) -> u8 {
        match meter {
            Some(value) => Self::level_from_meter(value),
            None => Self::level_for_rating(rating, difficulty),
        }
    }

    /// Initial question meter for a match, from the lower of the two ratings.
    pub fn initial_meter(rating_a: i32, rating_b: i32) -> u32 {
        let lower = rating_a.min(rating_b);
        if lower < 800 {
            2
        } else if lower < 1200 {
            5
        } else if lower < 1600 {
            8
        } else if lower < 2000 {
            12
        } else {
            15
        }
    }

    /// Resolve a level and draw a matching question in one step.
    pub fn generate(
        &self,
        difficulty: Difficulty,
        tags: &[String],
        rating: i32,
        meter: Option<u32>,
    ) -> Result<Question> {
        let level = Self::resolve_level(rating, difficulty, meter);
        debug!(
            "Generating question - difficulty: {}, level: {}, meter: {:?}",
            difficulty, level, meter
        );
        self.draw(difficulty, level, tags)
    }

    /// Draw uniformly at random among pool items matching (difficulty, level)
    /// and, if tags are supplied, at least one tag. An empty tag-filtered
    /// pool falls back to the unfiltered pool.
    pub fn draw(&self, difficulty: Difficulty, level: u8, tags: &[String]) -> Result<Question> {
        if !tags.is_empty() {
            if let Some(question) = self.draw_from_tag_cache(difficulty, level, tags)? {
                return Ok(question);
            }
        }

        let pool = self.pools.get(&(difficulty, level));
        let Some(pool) = pool.filter(|p| !p.is_empty()) else {
            return Err(ArenaError::NoQuestionsAvailable {
                difficulty: difficulty.to_string(),
                level,
            }
            .into());
        };

        if !tags.is_empty() {
            let filtered: Vec<Question> = pool
                .iter()
                .filter(|q| q.tags.iter().any(|t| tags.iter().any(|want| want == t)))
                .cloned()
                .collect();

            if filtered.is_empty() {
                warn!(
                    "No questions for {}/{} with tags {:?}, falling back to unfiltered pool",
                    difficulty, level, tags
                );
            } else {
                let question = Self::pick(&filtered)?;
                self.cache_tag_pool(difficulty, level, tags, filtered);
                return Ok(question);
            }
        }

        Self::pick(pool)
    }

    fn draw_from_tag_cache(
        &self,
        difficulty: Difficulty,
        level: u8,
        tags: &[String],
    ) -> Result<Option<Question>> {
        let cache = self
            .tag_pools
            .lock()
            .map_err(|_| ArenaError::InternalError {
                message: "Failed to acquire tag pool lock".to_string(),
            })?;

        match cache.get(&Self::tag_key(difficulty, level, tags)) {
            Some(pool) if !pool.is_empty() => Ok(Some(Self::pick(pool)?)),
            _ => Ok(None),
        }
    }

    fn cache_tag_pool(&self, difficulty: Difficulty, level: u8, tags: &[String], pool: Vec<Question>) {
        if let Ok(mut cache) = self.tag_pools.lock() {
            cache.insert(Self::tag_key(difficulty, level, tags), pool);
        }
    }

    fn tag_key(difficulty: Difficulty, level: u8, tags: &[String]) -> String {
        let mut sorted: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
        sorted.sort_unstable();
        format!("{}_{}_{}", difficulty, level, sorted.join(","))
    }

    fn pick(pool: &[Question]) -> Result<Question> {
        pool.choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                ArenaError::InternalError {
                    message: "Attempted draw from empty pool".to_string(),
                }
                .into()
            })
    }

    /// Drop all memoized tag-filtered sub-pools.
    pub fn clear_tag_cache(&self) {
        if let Ok(mut cache) = self.tag_pools.lock() {
            cache.clear();
        }
    }

    /// Pool/cache statistics for metrics and the status endpoint.
    pub fn statistics(&self) -> PoolStatistics {
        let mut by_difficulty: HashMap<String, usize> = HashMap::new();
        for ((difficulty, _), pool) in &self.pools {
            *by_difficulty.entry(difficulty.to_string()).or_default() += pool.len();
        }

        PoolStatistics {
            total_loaded: self.total_loaded,
            primary_keys: self.pools.len(),
            tag_cache_entries: self.tag_pools.lock().map(|c| c.len()).unwrap_or(0),
            by_difficulty,
        }
    }
}
