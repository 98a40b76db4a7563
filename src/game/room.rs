//! Per-match game room state machine

use crate::error::{ArenaError, Result};
use crate::game::{scoring, GameSettings};
use crate::question::QuestionSelector;
use crate::rating;
use crate::types::{
    AnswerRecord, Difficulty, EndReason, GameResults, GameSnapshot, GameState, OnlinePlayer,
    PlayerId, PlayerResult, Question, RoomId, RoomSummary, ScoreRecord,
};
use crate::utils::{current_timestamp, derive_room_id};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What a single answer submission produced
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub question_index: usize,
    pub correct: bool,
    pub first_to_answer: bool,
    pub question_meter: u32,
    pub score: ScoreRecord,
}

/// The per-match state machine.
///
/// Mutated only through its own methods; callers hold the manager's room
/// lock, so no two threads ever mutate a room concurrently.
#[derive(Debug)]
pub struct GameRoom {
    id: RoomId,
    players: [OnlinePlayer; 2],
    selector: Arc<QuestionSelector>,
    settings: GameSettings,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    state: GameState,
    /// Per-player index of the next question to issue
    progress: HashMap<PlayerId, usize>,
    /// Answers recorded per question index
    answers: HashMap<usize, HashMap<PlayerId, AnswerRecord>>,
    scores: HashMap<PlayerId, ScoreRecord>,
    /// Append-only; index k is materialized at most once and shared
    questions: Vec<Question>,
    question_meter: u32,
    /// Who answered first at the current frontier (controls the meter)
    meter_controller: Option<PlayerId>,
    difficulty: Difficulty,
    tags: Vec<String>,
    lower_rating: i32,
    disconnected: Option<(PlayerId, DateTime<Utc>)>,
}

impl GameRoom {
    pub fn new(
        players: [OnlinePlayer; 2],
        selector: Arc<QuestionSelector>,
        settings: GameSettings,
    ) -> Self {
        let created_at = current_timestamp();
        let id = derive_room_id(&players[0].id, &players[1].id, created_at);

        // The room plays at the lower-rated player's declared preferences
        let lower = if players[0].rating <= players[1].rating {
            &players[0]
        } else {
            &players[1]
        };
        let difficulty = lower.difficulty;
        let tags = lower.tags.clone();
        let lower_rating = lower.rating;

        let question_meter = QuestionSelector::initial_meter(players[0].rating, players[1].rating);

        let mut progress = HashMap::new();
        let mut scores = HashMap::new();
        for player in &players {
            progress.insert(player.id.clone(), 0);
            scores.insert(player.id.clone(), ScoreRecord::default());
        }

        Self {
            id,
            players,
            selector,
            settings,
            created_at,
            started_at: None,
            state: GameState::Waiting,
            progress,
            answers: HashMap::new(),
            scores,
            questions: Vec::new(),
            question_meter,
            meter_controller: None,
            difficulty,
            tags,
            lower_rating,
            disconnected: None,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn question_meter(&self) -> u32 {
        self.question_meter
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn players(&self) -> &[OnlinePlayer; 2] {
        &self.players
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.id == player_id)
    }

    /// The other participant.
    pub fn opponent_of(&self, player_id: &PlayerId) -> Option<&OnlinePlayer> {
        self.players.iter().find(|p| &p.id != player_id)
    }

    /// waiting → active. Anything else is a lifecycle violation.
    pub fn start(&mut self) -> Result<()> {
        if self.state != GameState::Waiting {
            return Err(ArenaError::InternalError {
                message: format!("Room {} cannot start from {:?}", self.id, self.state),
            }
            .into());
        }
        self.state = GameState::Active;
        self.started_at = Some(current_timestamp());
        Ok(())
    }

    /// Issue the next question for a player, materializing it on first
    /// reach. Returns `None` once the player has exhausted the game's
    /// question count.
    pub fn next_question(&mut self, player_id: &PlayerId) -> Result<Option<(usize, Question)>> {
        if self.state != GameState::Active {
            return Err(ArenaError::GameNotActive {
                room_id: self.id.clone(),
            }
            .into());
        }

        let index = *self
            .progress
            .get(player_id)
            .ok_or_else(|| ArenaError::PlayerNotFound {
                player_id: player_id.clone(),
            })?;

        if index >= self.settings.questions_per_game as usize {
            return Ok(None);
        }

        if self.questions.len() <= index {
            let question = self.selector.generate(
                self.difficulty,
                &self.tags,
                self.lower_rating,
                Some(self.question_meter),
            )?;
            debug!(
                "Room {} generated question {} (level {}, meter {})",
                self.id,
                index + 1,
                question.level,
                self.question_meter
            );
            self.questions.push(question);
            self.answers.insert(index, HashMap::new());
            // The first answer at the new frontier takes meter control
            self.meter_controller = None;
        }

        let question = self.questions[index].clone();
        self.progress.insert(player_id.clone(), index + 1);
        Ok(Some((index, question)))
    }

    /// The question a player last received, if any.
    pub fn current_question(&self, player_id: &PlayerId) -> Option<(usize, Question)> {
        let cursor = *self.progress.get(player_id)?;
        let index = cursor.checked_sub(1)?;
        self.questions.get(index).map(|q| (index, q.clone()))
    }

    /// Record an answer for the player's outstanding question.
    pub fn submit_answer(
        &mut self,
        player_id: &PlayerId,
        answer: &str,
        time_spent_ms: u64,
    ) -> Result<SubmitOutcome> {
        if self.state != GameState::Active {
            return Err(ArenaError::GameNotActive {
                room_id: self.id.clone(),
            }
            .into());
        }

        let cursor = *self
            .progress
            .get(player_id)
            .ok_or_else(|| ArenaError::PlayerNotFound {
                player_id: player_id.clone(),
            })?;
        let Some(index) = cursor.checked_sub(1) else {
            return Err(ArenaError::InternalError {
                message: format!("Player {} has no outstanding question", player_id),
            }
            .into());
        };

        let question = self.questions[index].clone();
        let recorded = self.answers.entry(index).or_default();
        if recorded.contains_key(player_id) {
            return Err(ArenaError::AlreadyAnswered {
                player_id: player_id.clone(),
                index,
            }
            .into());
        }

        let correct = scoring::check_answer(&question, answer);
        let first_to_answer = recorded.is_empty();
        recorded.insert(
            player_id.clone(),
            AnswerRecord {
                answer: answer.to_string(),
                correct,
                time_spent_ms,
                submitted_at: current_timestamp(),
            },
        );

        let score = self
            .scores
            .get_mut(player_id)
            .ok_or_else(|| ArenaError::PlayerNotFound {
                player_id: player_id.clone(),
            })?;
        score.questions_answered += 1;
        score.total_time_ms += time_spent_ms;
        if correct {
            score.streak += 1;
            score.best_streak = score.best_streak.max(score.streak);
            score.correct_answers += 1;
            score.score += scoring::streak_bonus(score.streak);
        } else {
            score.streak = 0;
        }
        let score = score.clone();

        if first_to_answer {
            self.meter_controller = Some(player_id.clone());
            let rating = self
                .players
                .iter()
                .find(|p| &p.id == player_id)
                .map(|p| p.rating)
                .unwrap_or(self.lower_rating);
            let change = scoring::meter_change(correct, rating, question.level);
            self.question_meter = self.question_meter.saturating_add_signed(change);
            debug!(
                "Room {} meter controlled by {}: change {}, now {}",
                self.id, player_id, change, self.question_meter
            );
        }

        Ok(SubmitOutcome {
            question_index: index,
            correct,
            first_to_answer,
            question_meter: self.question_meter,
            score,
        })
    }

    /// Both players have answered the full question count.
    pub fn both_finished(&self) -> bool {
        self.scores
            .values()
            .all(|s| s.questions_answered >= self.settings.questions_per_game)
    }

    /// Record a participant disconnect. The actual finish runs through
    /// `end` with the disconnector.
    pub fn mark_disconnected(&mut self, player_id: &PlayerId) {
        if self.disconnected.is_none() && self.contains(player_id) {
            self.disconnected = Some((player_id.clone(), current_timestamp()));
        }
    }

    pub fn disconnected_player(&self) -> Option<&PlayerId> {
        self.disconnected.as_ref().map(|(id, _)| id)
    }

    /// Finish the match and compute results. Returns `None` if the room is
    /// already completed, which is the double-invocation guard for racing
    /// end paths.
    pub fn end(
        &mut self,
        reason: EndReason,
        disconnector: Option<&PlayerId>,
    ) -> Result<Option<GameResults>> {
        if self.state == GameState::Completed {
            return Ok(None);
        }
        self.state = GameState::Completed;

        let winner_id = match disconnector {
            Some(leaver) => self
                .opponent_of(leaver)
                .map(|p| p.id.clone())
                .unwrap_or_else(|| self.players[0].id.clone()),
            None => {
                // Highest score, tie-broken by lower total answer time;
                // a full tie goes to the first participant.
                let mut winner = &self.players[0];
                for candidate in &self.players[1..] {
                    let (ws, cs) = (
                        &self.scores[&winner.id],
                        &self.scores[&candidate.id],
                    );
                    if cs.score > ws.score
                        || (cs.score == ws.score && cs.total_time_ms < ws.total_time_ms)
                    {
                        winner = candidate;
                    }
                }
                winner.id.clone()
            }
        };

        let players = self
            .players
            .iter()
            .map(|player| {
                let score = &self.scores[&player.id];
                let won = player.id == winner_id;
                let rating_delta = match disconnector {
                    Some(leaver) => rating::disconnect_delta(&player.id == leaver),
                    None => rating::normal_delta(won),
                };
                PlayerResult {
                    player_id: player.id.clone(),
                    username: player.username.clone(),
                    rating_before: player.rating,
                    rating_delta,
                    final_score: score.score,
                    correct_answers: score.correct_answers,
                    total_time_ms: score.total_time_ms,
                    best_streak: score.best_streak,
                    won,
                }
            })
            .collect();

        let duration_ms = (current_timestamp() - self.created_at)
            .num_milliseconds()
            .max(0) as u64;

        Ok(Some(GameResults {
            room_id: self.id.clone(),
            winner: winner_id,
            players,
            duration_ms,
            end_reason: reason,
            final_meter: self.question_meter,
        }))
    }

    /// Remaining wall-clock time once active.
    pub fn time_remaining_ms(&self) -> u64 {
        let Some(started_at) = self.started_at else {
            return self.settings.game_duration.as_millis() as u64;
        };
        if self.state != GameState::Active {
            return 0;
        }
        let elapsed = (current_timestamp() - started_at).num_milliseconds().max(0) as u64;
        (self.settings.game_duration.as_millis() as u64).saturating_sub(elapsed)
    }

    /// Whether the room's age exceeds the forced-reclamation ceiling.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let ceiling = chrono::Duration::from_std(self.settings.stale_room_ceiling)
            .unwrap_or_else(|_| chrono::Duration::seconds(1800));
        now - self.created_at > ceiling
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            room_id: self.id.clone(),
            state: self.state,
            progress: self.progress.clone(),
            scores: self.scores.clone(),
            question_meter: self.question_meter,
            time_remaining_ms: self.time_remaining_ms(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            players: self.players.iter().map(|p| p.brief()).collect(),
            created_at: self.created_at,
            state: self.state,
            question_meter: self.question_meter,
            difficulty: self.difficulty,
        }
    }

    pub fn score_of(&self, player_id: &PlayerId) -> Option<ScoreRecord> {
        self.scores.get(player_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::StaticQuestionSource;

    fn player(id: &str, rating: i32) -> OnlinePlayer {
        OnlinePlayer {
            id: id.to_string(),
            connection: format!("conn-{}", id),
            username: format!("user-{}", id),
            rating,
            difficulty: Difficulty::Medium,
            time_limit_seconds: 60,
            tags: vec![],
            in_game: true,
            joined_at: current_timestamp(),
            last_activity: current_timestamp(),
        }
    }

    fn room() -> GameRoom {
        room_with_ratings(1000, 1040)
    }

    fn room_with_ratings(a: i32, b: i32) -> GameRoom {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        GameRoom::new(
            [player("a", a), player("b", b)],
            selector,
            GameSettings::default(),
        )
    }

    #[test]
    fn test_new_room_is_waiting_with_initial_meter() {
        let room = room_with_ratings(1000, 1500);
        assert_eq!(room.state(), GameState::Waiting);
        // Lower rating 1000 → initial meter 5
        assert_eq!(room.question_meter(), 5);
        assert!(room.id().starts_with("a_b_"));
    }

    #[test]
    fn test_room_difficulty_follows_lower_rated_player() {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        let mut low = player("a", 900);
        low.difficulty = Difficulty::Easy;
        let mut high = player("b", 1900);
        high.difficulty = Difficulty::Hard;

        let room = GameRoom::new([high, low], selector, GameSettings::default());
        assert_eq!(room.summary().difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_start_transitions_once() {
        let mut room = room();
        room.start().unwrap();
        assert_eq!(room.state(), GameState::Active);
        assert!(room.start().is_err());
    }

    #[test]
    fn test_next_question_requires_active() {
        let mut room = room();
        assert!(room.next_question(&"a".to_string()).is_err());
    }

    #[test]
    fn test_question_sharing_is_deterministic() {
        let mut room = room();
        room.start().unwrap();

        // a reaches index 0 first; b must see the identical question
        let (idx_a, q_a) = room.next_question(&"a".to_string()).unwrap().unwrap();
        let (idx_b, q_b) = room.next_question(&"b".to_string()).unwrap().unwrap();
        assert_eq!(idx_a, 0);
        assert_eq!(idx_b, 0);
        assert_eq!(q_a, q_b);

        // a advances ahead; index 1 materializes once for a, then b catches up
        let (_, q_a1) = room.next_question(&"a".to_string()).unwrap().unwrap();
        let (_, q_b1) = room.next_question(&"b".to_string()).unwrap().unwrap();
        assert_eq!(q_a1, q_b1);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut room = room();
        room.start().unwrap();
        for _ in 0..10 {
            assert!(room.next_question(&"a".to_string()).unwrap().is_some());
        }
        assert!(room.next_question(&"a".to_string()).unwrap().is_none());
    }

    #[test]
    fn test_submit_answer_scores_and_streaks() {
        let mut room = room();
        room.start().unwrap();

        let (_, question) = room.next_question(&"a".to_string()).unwrap().unwrap();
        let outcome = room
            .submit_answer(&"a".to_string(), &question.answer, 1200)
            .unwrap();

        assert!(outcome.correct);
        assert!(outcome.first_to_answer);
        assert_eq!(outcome.score.score, 1);
        assert_eq!(outcome.score.streak, 1);
        assert_eq!(outcome.score.correct_answers, 1);
        assert_eq!(outcome.score.total_time_ms, 1200);
    }

    #[test]
    fn test_double_answer_is_rejected() {
        let mut room = room();
        room.start().unwrap();

        let (_, question) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.submit_answer(&"a".to_string(), &question.answer, 500)
            .unwrap();
        let err = room
            .submit_answer(&"a".to_string(), &question.answer, 500)
            .unwrap_err();
        assert!(err.to_string().contains("already answered"));
    }

    #[test]
    fn test_wrong_answer_resets_streak() {
        let mut room = room();
        room.start().unwrap();

        let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.submit_answer(&"a".to_string(), &q.answer, 100).unwrap();
        room.next_question(&"a".to_string()).unwrap().unwrap();
        let outcome = room
            .submit_answer(&"a".to_string(), "definitely wrong", 100)
            .unwrap();

        assert!(!outcome.correct);
        assert_eq!(outcome.score.streak, 0);
        assert_eq!(outcome.score.best_streak, 1);
        assert_eq!(outcome.score.score, 1);
    }

    #[test]
    fn test_only_first_answer_moves_meter() {
        let mut room = room();
        room.start().unwrap();
        let before = room.question_meter();

        let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.next_question(&"b".to_string()).unwrap().unwrap();

        let first = room
            .submit_answer(&"a".to_string(), &q.answer, 100)
            .unwrap();
        assert!(first.first_to_answer);
        assert_ne!(first.question_meter, before);

        let after_first = room.question_meter();
        let second = room
            .submit_answer(&"b".to_string(), &q.answer, 100)
            .unwrap();
        assert!(!second.first_to_answer);
        assert_eq!(second.question_meter, after_first);
    }

    #[test]
    fn test_meter_never_goes_below_zero() {
        let mut room = room_with_ratings(500, 600); // initial meter 2
        room.start().unwrap();

        for _ in 0..5 {
            room.next_question(&"a".to_string()).unwrap().unwrap();
            room.submit_answer(&"a".to_string(), "wrong", 100).unwrap();
        }
        assert_eq!(room.question_meter(), 0);
    }

    #[test]
    fn test_end_normal_picks_higher_score() {
        let mut room = room();
        room.start().unwrap();

        let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.next_question(&"b".to_string()).unwrap().unwrap();
        room.submit_answer(&"a".to_string(), &q.answer, 100).unwrap();
        room.submit_answer(&"b".to_string(), "wrong", 100).unwrap();

        let results = room.end(EndReason::Normal, None).unwrap().unwrap();
        assert_eq!(results.winner, "a");
        assert_eq!(results.end_reason, EndReason::Normal);

        let a = results.players.iter().find(|p| p.player_id == "a").unwrap();
        let b = results.players.iter().find(|p| p.player_id == "b").unwrap();
        assert!(a.won);
        assert_eq!(a.rating_delta, 5);
        assert!(!b.won);
        assert_eq!(b.rating_delta, -5);
    }

    #[test]
    fn test_end_tie_prefers_lower_total_time() {
        let mut room = room();
        room.start().unwrap();

        let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.next_question(&"b".to_string()).unwrap().unwrap();
        room.submit_answer(&"a".to_string(), &q.answer, 900).unwrap();
        room.submit_answer(&"b".to_string(), &q.answer, 400).unwrap();

        let results = room.end(EndReason::Normal, None).unwrap().unwrap();
        assert_eq!(results.winner, "b");
    }

    #[test]
    fn test_end_by_disconnect_always_loses_for_leaver() {
        let mut room = room();
        room.start().unwrap();

        // The leaver is ahead on score but still loses
        let (_, q) = room.next_question(&"a".to_string()).unwrap().unwrap();
        room.submit_answer(&"a".to_string(), &q.answer, 100).unwrap();

        room.mark_disconnected(&"a".to_string());
        let results = room
            .end(EndReason::OpponentDisconnect, Some(&"a".to_string()))
            .unwrap()
            .unwrap();

        assert_eq!(results.winner, "b");
        assert_eq!(results.end_reason, EndReason::OpponentDisconnect);
        let a = results.players.iter().find(|p| p.player_id == "a").unwrap();
        let b = results.players.iter().find(|p| p.player_id == "b").unwrap();
        assert_eq!(a.rating_delta, -10);
        assert_eq!(b.rating_delta, 5);
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut room = room();
        room.start().unwrap();

        assert!(room.end(EndReason::Normal, None).unwrap().is_some());
        assert!(room.end(EndReason::Normal, None).unwrap().is_none());
        assert_eq!(room.state(), GameState::Completed);
    }

    #[test]
    fn test_submit_after_completion_is_rejected() {
        let mut room = room();
        room.start().unwrap();
        room.next_question(&"a".to_string()).unwrap().unwrap();
        room.end(EndReason::Normal, None).unwrap();

        assert!(room.submit_answer(&"a".to_string(), "4", 100).is_err());
    }

    #[test]
    fn test_both_finished() {
        let mut room = room();
        room.start().unwrap();
        assert!(!room.both_finished());

        for _ in 0..10 {
            let (_, qa) = room.next_question(&"a".to_string()).unwrap().unwrap();
            room.submit_answer(&"a".to_string(), &qa.answer, 50).unwrap();
            let (_, qb) = room.next_question(&"b".to_string()).unwrap().unwrap();
            room.submit_answer(&"b".to_string(), &qb.answer, 60).unwrap();
        }
        assert!(room.both_finished());
    }

    #[test]
    fn test_snapshot_reflects_progress() {
        let mut room = room();
        room.start().unwrap();
        room.next_question(&"a".to_string()).unwrap().unwrap();

        let snapshot = room.snapshot();
        assert_eq!(snapshot.progress[&"a".to_string()], 1);
        assert_eq!(snapshot.progress[&"b".to_string()], 0);
        assert!(snapshot.time_remaining_ms > 0);
    }
}
