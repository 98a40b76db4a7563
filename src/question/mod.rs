//! Question pool loading and selection
//!
//! The pool is loaded once at startup from a `QuestionSource`, indexed by
//! (difficulty, level), and drawn from by the `QuestionSelector` using either
//! the per-match question meter or a static rating heuristic.

pub mod selector;
pub mod source;

pub use selector::{PoolStatistics, QuestionSelector};
pub use source::{JsonFileSource, QuestionSource, StaticQuestionSource};
