//! Scoring and adaptive-difficulty rules

use crate::types::Question;

/// Score increment for a correct answer at the given streak length.
///
/// Streaks pay a flat +1 until the first milestone, spike at 3, 5 and 10,
/// then again at every further multiple of 10.
pub fn streak_bonus(streak: u32) -> u32 {
    if streak <= 2 {
        1
    } else if streak == 3 {
        3
    } else if streak == 5 {
        5
    } else if streak == 10 || streak % 10 == 0 {
        10
    } else {
        1
    }
}

/// Question-meter change for the first answer recorded at an index.
///
/// The threshold grows with the answering player's rating: questions at or
/// below the tier threshold are "expected" and move the meter faster when
/// answered correctly.
pub fn meter_change(correct: bool, rating: i32, question_level: u8) -> i32 {
    const TIERS: [(i32, u8); 5] = [(400, 1), (800, 2), (1200, 2), (1600, 3), (2000, 4)];

    let threshold = TIERS
        .iter()
        .find(|(max, _)| rating <= *max)
        .map(|(_, t)| *t)
        .unwrap_or(5);

    if !correct {
        -1
    } else if question_level <= threshold {
        2
    } else {
        1
    }
}

/// Exact string-normalized comparison against the canonical answer.
pub fn check_answer(question: &Question, given: &str) -> bool {
    given.trim() == question.answer.trim()
}
