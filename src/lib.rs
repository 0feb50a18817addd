//! Adaptive progression engine: evaluates declarative achievement rules
//! against a student's accumulated activity and recomputes the difficulty of
//! the next exercise from a rolling window of recent attempts.
//!
//! The crate is a pure, synchronous computation library. Callers own all
//! I/O (event ingestion, unlock persistence, notification) and must route
//! each student's events through a single logical writer; across students
//! everything is freely parallel.

pub mod engine;
pub mod logging;
pub mod rules;

pub use engine::achievements::{AchievementRuleEngine, RegisteredRule};
pub use engine::aggregator::ActivityAggregator;
pub use engine::config::EngineConfig;
pub use engine::difficulty::DifficultyController;
pub use engine::error::EngineError;
pub use engine::store::WindowStore;
pub use engine::types::{
    AchievementUnlockDecision, AchievementUnlockRecord, ActivityEvent, Confidence,
    DifficultyLevel, DifficultyVerdict, EventKind, EventPayload, Recommendation,
    StudentActivityWindow,
};
pub use rules::evaluator::{ConditionEvaluator, ConditionOutcome, RuleEvaluation};
pub use rules::migration::translate_legacy_rule;
pub use rules::schema::{RuleCondition, RuleSchema, RuleSchemaError};
