//! Best-effort translation of legacy free-text trigger rules into the
//! structured schema.
//!
//! This is a boundary adapter: its pattern heuristics never leak into the
//! evaluator. Recognized patterns produce a valid `RuleSchema` stamped with
//! migration provenance; anything else returns `None` and requires manual
//! authoring.

use std::collections::HashMap;

use regex::Regex;
use serde_json::json;

use crate::rules::schema::{
    ChainOperator, ExerciseCondition, PerformanceCondition, RuleCondition, RuleMetadata,
    RuleSchema, StreakCondition,
};

pub struct LegacyRuleTranslator {
    exercise_count: Regex,
    streak: Regex,
    perfect_score: Regex,
}

impl LegacyRuleTranslator {
    pub fn new() -> Self {
        // The patterns mirror the shapes found in legacy trigger_rule data:
        // "complete_10_exercises_easy", "7 day streak", "perfect_score_3".
        Self {
            exercise_count: Regex::new(
                r"(?i)complete[_\s]*(\d+)[_\s]*exercises?(?:[_\s]*(easy|medium|hard|expert))?",
            )
            .expect("static regex"),
            streak: Regex::new(r"(?i)(\d+)[_\s]*day[s]?[_\s]*streak").expect("static regex"),
            perfect_score: Regex::new(r"(?i)perfect[_\s]*score[_\s]*(\d+)?").expect("static regex"),
        }
    }

    /// Translates legacy rule text, returning `None` when no pattern matches.
    /// The output always validates against the schema invariants.
    pub fn translate(&self, legacy_text: &str, achievement_name: &str) -> Option<RuleSchema> {
        let normalized = legacy_text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let schema = self
            .try_exercise_completion(&normalized)
            .or_else(|| self.try_streak(&normalized))
            .or_else(|| self.try_perfect_score(&normalized));

        match schema {
            Some(mut schema) => {
                schema.metadata = Some(migration_metadata(legacy_text, achievement_name));
                debug_assert!(schema.validate().is_ok());
                tracing::info!(
                    achievement = %achievement_name,
                    rule_type = %schema.rule_type,
                    "migrated legacy rule"
                );
                Some(schema)
            }
            None => {
                tracing::warn!(
                    achievement = %achievement_name,
                    rule = %legacy_text,
                    "legacy rule not recognized, manual authoring required"
                );
                None
            }
        }
    }

    fn try_exercise_completion(&self, rule: &str) -> Option<RuleSchema> {
        let captures = self.exercise_count.captures(rule)?;
        let required_count: i32 = captures.get(1)?.as_str().parse().ok()?;
        if required_count <= 0 {
            return None;
        }
        let difficulty = captures.get(2).map(|m| m.as_str().to_string());

        Some(RuleSchema {
            version: "1.0".to_string(),
            rule_type: "EXERCISE_COMPLETION".to_string(),
            conditions: vec![RuleCondition::Exercise(ExerciseCondition {
                operator: ChainOperator::And,
                priority: Some(1),
                required_count,
                difficulty,
                learning_point_ids: None,
                exercise_type_ids: None,
                time_frame_days: None,
                minimum_accuracy: None,
            })],
            metadata: None,
        })
    }

    fn try_streak(&self, rule: &str) -> Option<RuleSchema> {
        let captures = self.streak.captures(rule)?;
        let days: i32 = captures.get(1)?.as_str().parse().ok()?;
        if days <= 0 {
            return None;
        }

        Some(RuleSchema {
            version: "1.0".to_string(),
            rule_type: "STREAK_ACHIEVEMENT".to_string(),
            conditions: vec![RuleCondition::Streak(StreakCondition {
                operator: ChainOperator::And,
                priority: Some(1),
                required_streak_length: days,
                streak_type: Some("daily".to_string()),
                minimum_activity_per_day: None,
            })],
            metadata: None,
        })
    }

    fn try_perfect_score(&self, rule: &str) -> Option<RuleSchema> {
        let captures = self.perfect_score.captures(rule)?;
        let attempts = captures
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);

        Some(RuleSchema {
            version: "1.0".to_string(),
            rule_type: "PERFECT_SCORE".to_string(),
            conditions: vec![RuleCondition::Performance(PerformanceCondition {
                operator: ChainOperator::And,
                priority: Some(1),
                minimum_score: Some(100.0),
                minimum_average: None,
                minimum_attempts: Some(attempts),
                performance_type: Some("score".to_string()),
            })],
            metadata: None,
        })
    }
}

impl Default for LegacyRuleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates a single legacy rule with a fresh translator.
pub fn translate_legacy_rule(legacy_text: &str, achievement_name: &str) -> Option<RuleSchema> {
    LegacyRuleTranslator::new().translate(legacy_text, achievement_name)
}

fn migration_metadata(original_rule: &str, achievement_name: &str) -> RuleMetadata {
    let mut custom = HashMap::new();
    custom.insert("originalRule".to_string(), json!(original_rule));
    RuleMetadata {
        description: Some(format!(
            "Auto-migrated from legacy rule for '{achievement_name}'"
        )),
        category: Some("auto-migrated".to_string()),
        difficulty: None,
        tags: None,
        custom_properties: Some(custom),
        created_by: Some("legacy-rule-migration".to_string()),
    }
}
