//! Declarative condition evaluation against a student's aggregated window
//! and raw event history.
//!
//! Leaf conditions read the aggregate counters unless they carry filters, in
//! which case they re-count from the raw events. Composites combine their
//! sub-conditions with ALL/ANY/NONE in priority order. A top-level condition
//! list combines with each condition's own operator, read pairwise left to
//! right with no precedence climbing; NOT negates the single condition it is
//! attached to. That scan is preserved for compatibility with existing rule
//! data.
//!
//! Unknown condition variants fail closed: the condition evaluates to false
//! and is logged at warn level so a configuration bug stays distinguishable
//! from "condition not yet met".

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::engine::types::{ActivityEvent, DifficultyLevel, EventPayload, StudentActivityWindow};
use crate::rules::schema::{
    ChainOperator, CompositeCondition, ExerciseCondition, LogicalOperator, PerformanceCondition,
    RuleCondition, RuleSchema, StreakCondition, TimeCondition, TimeScope,
};

/// Per-condition evaluation detail, carrying actual vs required values for
/// observability independent of pass/fail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionOutcome {
    pub condition_type: String,
    pub passed: bool,
    pub description: String,
    pub actual: Map<String, Value>,
    pub required: Map<String, Value>,
    /// Measurable progress ratio in [0, 1] for countable conditions; None for
    /// purely boolean ones.
    pub progress: Option<f64>,
    /// Sub-condition outcomes, non-empty only for composites.
    pub children: Vec<ConditionOutcome>,
}

impl ConditionOutcome {
    fn leaf(
        condition_type: &str,
        passed: bool,
        description: String,
        actual: Map<String, Value>,
        required: Map<String, Value>,
        progress: Option<f64>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            passed,
            description,
            actual,
            required,
            progress,
            children: Vec::new(),
        }
    }

    fn failed(condition_type: &str, description: impl Into<String>) -> Self {
        Self::leaf(
            condition_type,
            false,
            description.into(),
            Map::new(),
            Map::new(),
            None,
        )
    }

    /// Progress ratios of all leaf conditions under this outcome, clamped to
    /// [0, 1]; boolean leaves contribute 1.0 when passed and 0.0 otherwise.
    pub fn leaf_ratios(&self, out: &mut Vec<f64>) {
        if self.condition_type == "COMPOSITE" {
            for child in &self.children {
                child.leaf_ratios(out);
            }
        } else {
            let ratio = self
                .progress
                .unwrap_or(if self.passed { 1.0 } else { 0.0 });
            out.push(ratio.clamp(0.0, 1.0));
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluation {
    pub passed: bool,
    pub rule_type: String,
    pub outcomes: Vec<ConditionOutcome>,
    pub failure_reason: Option<String>,
    /// Minimum leaf progress ratio, clamped to [0, 1].
    pub completion: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates a full rule: every condition in the list is evaluated (no
    /// top-level short-circuit, so observability data is complete), then the
    /// boolean results combine via the left-to-right operator scan.
    pub fn evaluate_rule(
        &self,
        schema: &RuleSchema,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> RuleEvaluation {
        let outcomes: Vec<ConditionOutcome> = schema
            .conditions
            .iter()
            .map(|c| self.evaluate(c, window, raw_events))
            .collect();

        let mut combined = false;
        for (i, (condition, outcome)) in schema.conditions.iter().zip(&outcomes).enumerate() {
            let term = if condition.operator() == ChainOperator::Not {
                !outcome.passed
            } else {
                outcome.passed
            };
            combined = if i == 0 {
                term
            } else {
                match condition.operator() {
                    ChainOperator::And | ChainOperator::Not => combined && term,
                    ChainOperator::Or => combined || term,
                }
            };
        }

        let mut ratios = Vec::new();
        for outcome in &outcomes {
            outcome.leaf_ratios(&mut ratios);
        }
        let completion = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().copied().fold(f64::INFINITY, f64::min).clamp(0.0, 1.0)
        };

        let failure_reason = if combined {
            None
        } else {
            outcomes
                .iter()
                .find(|o| !o.passed)
                .map(|o| o.description.clone())
        };

        tracing::debug!(
            student_id = %window.student_id,
            rule_type = %schema.rule_type,
            passed = combined,
            completion,
            "rule evaluated"
        );

        RuleEvaluation {
            passed: combined,
            rule_type: schema.rule_type.clone(),
            outcomes,
            failure_reason,
            completion,
        }
    }

    /// Evaluates a single condition. Never panics and never aborts siblings:
    /// anything unsupported fails closed.
    pub fn evaluate(
        &self,
        condition: &RuleCondition,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> ConditionOutcome {
        match condition {
            RuleCondition::Exercise(c) => self.evaluate_exercise(c, window, raw_events),
            RuleCondition::Streak(c) => self.evaluate_streak(c, window, raw_events),
            RuleCondition::Time(c) => self.evaluate_time(c, window),
            RuleCondition::Performance(c) => self.evaluate_performance(c, window, raw_events),
            RuleCondition::Composite(c) => self.evaluate_composite(c, window, raw_events),
            RuleCondition::Unknown { condition_type } => {
                tracing::warn!(
                    condition_type = %condition_type,
                    student_id = %window.student_id,
                    "unsupported condition type, failing closed"
                );
                ConditionOutcome::failed(
                    condition_type,
                    format!("unsupported condition type: {condition_type}"),
                )
            }
        }
    }

    fn evaluate_exercise(
        &self,
        c: &ExerciseCondition,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> ConditionOutcome {
        if c.required_count <= 0 {
            return ConditionOutcome::failed("EXERCISE", "required count must be positive");
        }

        let difficulty_filter = difficulty_filter(c.difficulty.as_deref());
        let has_filters = difficulty_filter.is_some()
            || c.learning_point_ids.is_some()
            || c.exercise_type_ids.is_some()
            || c.time_frame_days.is_some();

        let (count, correct) = if has_filters {
            let cutoff = c
                .time_frame_days
                .and_then(|days| event_anchor(window, raw_events).map(|a| a - Duration::days(days as i64)));
            let mut count = 0u32;
            let mut correct = 0u32;
            for event in raw_events.iter().filter(|e| e.student_id == window.student_id) {
                let EventPayload::ExerciseCompleted(p) = &event.payload else {
                    continue;
                };
                if let Some(filter) = difficulty_filter {
                    if p.difficulty != filter {
                        continue;
                    }
                }
                if let Some(ref ids) = c.learning_point_ids {
                    if !p.learning_point_id.is_some_and(|id| ids.contains(&id)) {
                        continue;
                    }
                }
                if let Some(ref ids) = c.exercise_type_ids {
                    if !p.exercise_type_id.is_some_and(|id| ids.contains(&id)) {
                        continue;
                    }
                }
                if let Some(cutoff) = cutoff {
                    if event.occurred_at < cutoff {
                        continue;
                    }
                }
                count += 1;
                if p.is_correct {
                    correct += 1;
                }
            }
            (count, correct)
        } else {
            (window.total_attempts, window.correct_attempts)
        };

        let required = c.required_count as u32;
        let mut passed = count >= required;
        let mut progress = (count as f64 / required as f64).clamp(0.0, 1.0);

        let mut actual = Map::new();
        let mut required_values = Map::new();
        actual.insert("completedExercises".into(), json!(count));
        required_values.insert("requiredCount".into(), json!(c.required_count));
        if let Some(ref difficulty) = c.difficulty {
            required_values.insert("difficulty".into(), json!(difficulty));
        }

        if let Some(min_accuracy) = c.minimum_accuracy {
            let accuracy = if count == 0 {
                0.0
            } else {
                correct as f64 / count as f64 * 100.0
            };
            actual.insert("averageAccuracy".into(), json!(accuracy));
            required_values.insert("minimumAccuracy".into(), json!(min_accuracy));
            if accuracy < min_accuracy {
                passed = false;
            }
            if min_accuracy > 0.0 {
                progress = progress.min((accuracy / min_accuracy).clamp(0.0, 1.0));
            }
        }

        let description = if passed {
            format!("completed {count} exercises (required: {required})")
        } else {
            format!("only {count} qualifying exercises, {required} required")
        };

        ConditionOutcome::leaf("EXERCISE", passed, description, actual, required_values, Some(progress))
    }

    fn evaluate_streak(
        &self,
        c: &StreakCondition,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> ConditionOutcome {
        let streak_type = c.streak_type.as_deref().unwrap_or("daily");
        let current = window.streak_length(streak_type);
        let required = c.required_streak_length.max(0) as u32;

        let mut passed = required > 0 && current >= required;
        let progress = if required == 0 {
            0.0
        } else {
            (current as f64 / required as f64).clamp(0.0, 1.0)
        };

        let mut actual = Map::new();
        let mut required_values = Map::new();
        actual.insert("currentStreak".into(), json!(current));
        required_values.insert("requiredStreakLength".into(), json!(c.required_streak_length));
        required_values.insert("streakType".into(), json!(streak_type));

        // Activity density gate: the streak only counts if the student kept up
        // the configured volume of exercises per day over the streak span.
        if let (Some(min_per_day), true) = (c.minimum_activity_per_day, passed) {
            let span_days = required as i64;
            let activity = event_anchor(window, raw_events)
                .map(|anchor| {
                    let cutoff = anchor - Duration::days(span_days);
                    raw_events
                        .iter()
                        .filter(|e| {
                            e.student_id == window.student_id
                                && e.occurred_at >= cutoff
                                && matches!(e.payload, EventPayload::ExerciseCompleted(_))
                        })
                        .count() as i64
                })
                .unwrap_or(0);
            let needed = min_per_day as i64 * span_days;
            actual.insert("activityInStreakSpan".into(), json!(activity));
            required_values.insert("minimumActivityPerDay".into(), json!(min_per_day));
            if activity < needed {
                passed = false;
            }
        }

        let description = if passed {
            format!("current {streak_type} streak: {current} (required: {required})")
        } else {
            format!("current {streak_type} streak: {current}, {required} required")
        };

        ConditionOutcome::leaf("STREAK", passed, description, actual, required_values, Some(progress))
    }

    fn evaluate_time(&self, c: &TimeCondition, window: &StudentActivityWindow) -> ConditionOutcome {
        if window.attempts.is_empty() {
            return ConditionOutcome::failed("TIME", "no attempts in window");
        }
        if c.max_time_seconds.is_none() && c.min_time_seconds.is_none() {
            return ConditionOutcome::leaf(
                "TIME",
                true,
                "no time bounds specified".to_string(),
                Map::new(),
                Map::new(),
                None,
            );
        }

        let measured: f64 = match c.time_type {
            TimeScope::PerExercise => {
                // Bound applies to every attempt; the worst offender decides.
                let worst_max = window
                    .attempts
                    .iter()
                    .map(|a| a.time_spent_seconds)
                    .max()
                    .unwrap_or(0);
                let worst_min = window
                    .attempts
                    .iter()
                    .map(|a| a.time_spent_seconds)
                    .min()
                    .unwrap_or(0);
                let max_ok = c.max_time_seconds.is_none_or(|max| worst_max <= max);
                let min_ok = c.min_time_seconds.is_none_or(|min| worst_min >= min);
                return self.time_outcome(c, max_ok && min_ok, worst_max as f64);
            }
            TimeScope::TotalSession => window
                .attempts
                .iter()
                .map(|a| a.time_spent_seconds as f64)
                .sum(),
            TimeScope::Average => {
                let total: i64 = window
                    .attempts
                    .iter()
                    .map(|a| a.time_spent_seconds as i64)
                    .sum();
                total as f64 / window.attempts.len() as f64
            }
        };

        let max_ok = c.max_time_seconds.is_none_or(|max| measured <= max as f64);
        let min_ok = c.min_time_seconds.is_none_or(|min| measured >= min as f64);
        self.time_outcome(c, max_ok && min_ok, measured)
    }

    fn time_outcome(&self, c: &TimeCondition, passed: bool, measured: f64) -> ConditionOutcome {
        let mut actual = Map::new();
        let mut required_values = Map::new();
        actual.insert("measuredSeconds".into(), json!(measured));
        if let Some(max) = c.max_time_seconds {
            required_values.insert("maxTimeSeconds".into(), json!(max));
        }
        if let Some(min) = c.min_time_seconds {
            required_values.insert("minTimeSeconds".into(), json!(min));
        }
        let description = if passed {
            format!("time bound satisfied ({measured:.0}s)")
        } else {
            format!("time bound violated ({measured:.0}s)")
        };
        ConditionOutcome::leaf("TIME", passed, description, actual, required_values, None)
    }

    fn evaluate_performance(
        &self,
        c: &PerformanceCondition,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> ConditionOutcome {
        let performance_type = c.performance_type.as_deref().unwrap_or(
            if c.minimum_average.is_some() {
                "average"
            } else {
                "score"
            },
        );

        match performance_type {
            "score" => {
                let threshold = c.minimum_score.unwrap_or(100.0);
                let needed = c.minimum_attempts.unwrap_or(1).max(1) as u32;
                let qualifying = window
                    .attempts
                    .iter()
                    .filter(|a| a.score.is_some_and(|s| s >= threshold))
                    .count() as u32;
                let passed = qualifying >= needed;
                let progress = (qualifying as f64 / needed as f64).clamp(0.0, 1.0);

                let mut actual = Map::new();
                let mut required_values = Map::new();
                actual.insert("qualifyingAttempts".into(), json!(qualifying));
                required_values.insert("minimumScore".into(), json!(threshold));
                required_values.insert("minimumAttempts".into(), json!(needed));

                let description = if passed {
                    format!("{qualifying} attempts at or above {threshold} (required: {needed})")
                } else {
                    format!("{qualifying} attempts at or above {threshold}, {needed} required")
                };
                ConditionOutcome::leaf(
                    "PERFORMANCE",
                    passed,
                    description,
                    actual,
                    required_values,
                    Some(progress),
                )
            }
            "average" | "accuracy" => {
                let threshold = match c.minimum_average.or(c.minimum_score) {
                    Some(t) => t,
                    None => {
                        return ConditionOutcome::failed(
                            "PERFORMANCE",
                            "no minimum average specified",
                        )
                    }
                };
                let average = if performance_type == "accuracy" {
                    window.success_rate() * 100.0
                } else {
                    let scored: Vec<f64> =
                        window.attempts.iter().filter_map(|a| a.score).collect();
                    if scored.is_empty() {
                        0.0
                    } else {
                        scored.iter().sum::<f64>() / scored.len() as f64
                    }
                };
                let enough_attempts = c
                    .minimum_attempts
                    .is_none_or(|min| window.total_attempts >= min.max(0) as u32);
                let passed = enough_attempts && average >= threshold;
                let progress = if threshold > 0.0 {
                    (average / threshold).clamp(0.0, 1.0)
                } else {
                    1.0
                };

                let mut actual = Map::new();
                let mut required_values = Map::new();
                actual.insert("average".into(), json!(average));
                actual.insert("totalAttempts".into(), json!(window.total_attempts));
                required_values.insert("minimumAverage".into(), json!(threshold));
                if let Some(min) = c.minimum_attempts {
                    required_values.insert("minimumAttempts".into(), json!(min));
                }

                let description = if passed {
                    format!("average {average:.1} meets minimum {threshold:.1}")
                } else {
                    format!("average {average:.1} below minimum {threshold:.1}")
                };
                ConditionOutcome::leaf(
                    "PERFORMANCE",
                    passed,
                    description,
                    actual,
                    required_values,
                    Some(progress),
                )
            }
            "improvement" => {
                let threshold = c.minimum_average.or(c.minimum_score).unwrap_or(0.0);
                let best = raw_events
                    .iter()
                    .filter(|e| e.student_id == window.student_id)
                    .filter_map(|e| match &e.payload {
                        EventPayload::PerformanceImproved(p) => Some(p.improvement_percentage),
                        _ => None,
                    })
                    .fold(f64::NEG_INFINITY, f64::max);
                let passed = best.is_finite() && best >= threshold;

                let mut actual = Map::new();
                let mut required_values = Map::new();
                if best.is_finite() {
                    actual.insert("bestImprovement".into(), json!(best));
                }
                required_values.insert("minimumImprovement".into(), json!(threshold));

                let description = if passed {
                    format!("improvement of {best:.1}% recorded (required: {threshold:.1}%)")
                } else {
                    "no qualifying performance improvement".to_string()
                };
                ConditionOutcome::leaf(
                    "PERFORMANCE",
                    passed,
                    description,
                    actual,
                    required_values,
                    None,
                )
            }
            other => {
                tracing::warn!(
                    performance_type = %other,
                    "unsupported performance type, failing closed"
                );
                ConditionOutcome::failed(
                    "PERFORMANCE",
                    format!("unsupported performance type: {other}"),
                )
            }
        }
    }

    fn evaluate_composite(
        &self,
        c: &CompositeCondition,
        window: &StudentActivityWindow,
        raw_events: &[ActivityEvent],
    ) -> ConditionOutcome {
        // Priority ascending, None last; stable sort keeps list order on ties.
        let mut ordered: Vec<&RuleCondition> = c.sub_conditions.iter().collect();
        ordered.sort_by_key(|sub| sub.priority().map(|p| p as i64).unwrap_or(i64::MAX));

        let mut children = Vec::new();
        let passed = match c.logical_operator {
            LogicalOperator::All => {
                let mut all = true;
                for sub in &ordered {
                    let outcome = self.evaluate(sub, window, raw_events);
                    let sub_passed = outcome.passed;
                    children.push(outcome);
                    if !sub_passed {
                        all = false;
                        break;
                    }
                }
                all
            }
            LogicalOperator::Any => {
                let mut any = false;
                for sub in &ordered {
                    let outcome = self.evaluate(sub, window, raw_events);
                    let sub_passed = outcome.passed;
                    children.push(outcome);
                    if sub_passed {
                        any = true;
                        break;
                    }
                }
                any
            }
            LogicalOperator::None => {
                let mut none = true;
                for sub in &ordered {
                    let outcome = self.evaluate(sub, window, raw_events);
                    let sub_passed = outcome.passed;
                    children.push(outcome);
                    if sub_passed {
                        none = false;
                        break;
                    }
                }
                none
            }
        };

        let description = format!(
            "composite {:?} over {} sub-conditions: {}",
            c.logical_operator,
            c.sub_conditions.len(),
            if passed { "satisfied" } else { "not satisfied" }
        );

        ConditionOutcome {
            condition_type: "COMPOSITE".to_string(),
            passed,
            description,
            actual: Map::new(),
            required: Map::new(),
            progress: None,
            children,
        }
    }
}

fn difficulty_filter(difficulty: Option<&str>) -> Option<DifficultyLevel> {
    let raw = difficulty?;
    if raw.eq_ignore_ascii_case("any") {
        return None;
    }
    let parsed = DifficultyLevel::parse(raw);
    if parsed.is_none() {
        tracing::warn!(difficulty = %raw, "unrecognized difficulty filter, ignoring");
    }
    parsed
}

/// Time reference for relative filters. Taken from the event history, not the
/// wall clock, so evaluation stays deterministic for a fixed input.
fn event_anchor(
    window: &StudentActivityWindow,
    raw_events: &[ActivityEvent],
) -> Option<DateTime<Utc>> {
    raw_events
        .iter()
        .filter(|e| e.student_id == window.student_id)
        .map(|e| e.occurred_at)
        .max()
        .or(window.last_event_at)
}
