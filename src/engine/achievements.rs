//! Achievement rule orchestration.
//!
//! Runs every registered rule against the student's updated window whenever
//! a new event arrives and emits unlock decisions for rules that pass.
//! The engine is side-effect free and safely retryable: the caller's
//! persistence layer performs the atomic check-then-insert that enforces the
//! one-unlock-per-(student, achievement) invariant.

use std::collections::HashSet;

use crate::engine::types::{AchievementUnlockDecision, ActivityEvent, StudentActivityWindow};
use crate::rules::evaluator::{ConditionEvaluator, RuleEvaluation};
use crate::rules::schema::{RuleSchema, RuleSchemaError};

/// A validated rule bound to the achievement it unlocks.
#[derive(Debug, Clone)]
pub struct RegisteredRule {
    pub achievement_id: i64,
    pub rule_id: String,
    pub schema: RuleSchema,
}

impl RegisteredRule {
    /// Validates the schema at registration time. Invalid schemas are
    /// rejected here, never at evaluation time.
    pub fn register(
        achievement_id: i64,
        rule_id: impl Into<String>,
        schema: RuleSchema,
    ) -> Result<Self, RuleSchemaError> {
        schema.validate()?;
        Ok(Self {
            achievement_id,
            rule_id: rule_id.into(),
            schema,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementRuleEngine {
    evaluator: ConditionEvaluator,
}

impl AchievementRuleEngine {
    pub fn new() -> Self {
        Self {
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Evaluates all registered rules against the student's state after
    /// `event` was applied. `raw_events` is the event history available to
    /// conditions that re-filter events (difficulty, type, time frame);
    /// passing just the triggering event is valid when no rule needs history.
    ///
    /// Rules whose achievement is already unlocked are skipped; each
    /// remaining rule that passes yields one decision. Replaying the same
    /// event with the same `already_unlocked` set produces the same
    /// decisions.
    pub fn on_activity(
        &self,
        event: &ActivityEvent,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
        rules: &[RegisteredRule],
        already_unlocked: &HashSet<i64>,
    ) -> Vec<AchievementUnlockDecision> {
        debug_assert_eq!(window.student_id, event.student_id);

        let mut decisions = Vec::new();
        for rule in rules {
            if already_unlocked.contains(&rule.achievement_id) {
                continue;
            }

            let evaluation = self.evaluator.evaluate_rule(&rule.schema, window, raw_events);
            if evaluation.passed {
                tracing::info!(
                    student_id = %window.student_id,
                    achievement_id = rule.achievement_id,
                    rule_id = %rule.rule_id,
                    completion = evaluation.completion,
                    "achievement rule passed"
                );
                decisions.push(AchievementUnlockDecision {
                    achievement_id: rule.achievement_id,
                    rule_id: rule.rule_id.clone(),
                    triggering_event_id: event.event_id,
                    completion_percentage: evaluation.completion,
                });
            }
        }
        decisions
    }

    /// Evaluates a single rule, exposing per-condition detail and the
    /// completion ratio regardless of pass/fail. Used for progress displays
    /// and diagnostics.
    pub fn evaluate_rule(
        &self,
        rule: &RegisteredRule,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> RuleEvaluation {
        self.evaluator.evaluate_rule(&rule.schema, window, raw_events)
    }
}
