//! Question sources for populating the selector pool
//!
//! The external question authoring pipeline is out of scope; the service
//! only needs something that can hand over the full pool once at startup.

use crate::error::Result;
use crate::types::{Difficulty, Question};
use std::path::PathBuf;

/// Source of the preloaded question pool
pub trait QuestionSource: Send + Sync {
    /// Load the complete pool. Called once at startup.
    fn load(&self) -> Result<Vec<Question>>;
}

/// Built-in arithmetic pool covering every (difficulty, level, tag)
/// combination. Backs tests and the queue-tester binary; production deploys
/// load a curated pool from file instead.
#[derive(Debug, Default)]
pub struct StaticQuestionSource;

impl StaticQuestionSource {
    pub fn new() -> Self {
        Self
    }

    fn build(difficulty: Difficulty, level: u8, variant: u32) -> [Question; 4] {
        // Operands scale with level so higher levels read harder; answers
        // stay exact so string comparison is well-defined.
        let base = level as i64 * 7 + variant as i64;
        let a = base + 3;
        let b = (level as i64) + 2 + (variant as i64 % 3);

        let make = |tag: &str, symbol: &str, answer: i64| Question {
            prompt: format!("What is {} {} {}?", a, symbol, b),
            operand_a: a.to_string(),
            operand_b: b.to_string(),
            answer: answer.to_string(),
            tags: vec![tag.to_string()],
            level,
            difficulty,
        };

        [
            make("sum", "+", a + b),
            make("difference", "-", a - b),
            make("product", "*", a * b),
            // Division items are phrased over the product so the quotient is exact
            Question {
                prompt: format!("What is {} / {}?", a * b, b),
                operand_a: (a * b).to_string(),
                operand_b: b.to_string(),
                answer: a.to_string(),
                tags: vec!["quotient".to_string()],
                level,
                difficulty,
            },
        ]
    }
}

impl QuestionSource for StaticQuestionSource {
    fn load(&self) -> Result<Vec<Question>> {
        let mut pool = Vec::new();
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            for level in 1..=10u8 {
                for variant in 0..3u32 {
                    pool.extend(Self::build(difficulty, level, variant));
                }
            }
        }
        Ok(pool)
    }
}

/// Loads a curated pool from a JSON file (an array of `Question` values)
#[derive(Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl QuestionSource for JsonFileSource {
    fn load(&self) -> Result<Vec<Question>> {
        let raw = std::fs::read_to_string(&self.path)?;
        let pool: Vec<Question> = serde_json::from_str(&raw)?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_covers_all_keys() {
        let pool = StaticQuestionSource::new().load().unwrap();

        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            for level in 1..=10u8 {
                let matching: Vec<_> = pool
                    .iter()
                    .filter(|q| q.difficulty == difficulty && q.level == level)
                    .collect();
                assert!(
                    !matching.is_empty(),
                    "no questions for {:?} level {}",
                    difficulty,
                    level
                );

                for tag in ["sum", "difference", "product", "quotient"] {
                    assert!(
                        matching.iter().any(|q| q.tags.iter().any(|t| t == tag)),
                        "missing tag {} for {:?} level {}",
                        tag,
                        difficulty,
                        level
                    );
                }
            }
        }
    }

    #[test]
    fn test_static_source_answers_are_exact() {
        let pool = StaticQuestionSource::new().load().unwrap();
        for q in pool.iter().filter(|q| q.tags.contains(&"quotient".to_string())) {
            let a: i64 = q.operand_a.parse().unwrap();
            let b: i64 = q.operand_b.parse().unwrap();
            let answer: i64 = q.answer.parse().unwrap();
            assert_eq!(a, answer * b, "inexact quotient in {}", q.prompt);
        }
    }
}
