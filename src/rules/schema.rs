//! Structured achievement rule schema, version 1.x.
//!
//! The wire format is JSON with a `conditionType` discriminator
//! (EXERCISE, STREAK, TIME, PERFORMANCE, COMPOSITE). Unknown discriminators
//! deserialize to `RuleCondition::Unknown` so a misconfigured rule fails
//! closed at evaluation instead of aborting its siblings.

use std::collections::HashMap;

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum RuleSchemaError {
    #[error("rule has no conditions")]
    EmptyConditions,
    #[error("invalid rule version '{0}', expected 1.x")]
    InvalidVersion(String),
    #[error("composite condition has no sub-conditions")]
    EmptyComposite,
    #[error("exercise condition requires a positive count, got {0}")]
    NonPositiveCount(i32),
    #[error("malformed rule JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a condition combines with the condition before it in a top-level list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainOperator {
    #[default]
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOperator {
    All,
    Any,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScope {
    PerExercise,
    TotalSession,
    Average,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseCondition {
    #[serde(default)]
    pub operator: ChainOperator,
    #[serde(default)]
    pub priority: Option<i32>,
    pub required_count: i32,
    /// "easy", "medium", "hard", "expert"; "any" or absent means no filter.
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub learning_point_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub exercise_type_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub time_frame_days: Option<i32>,
    /// Percentage in [0, 100].
    #[serde(default)]
    pub minimum_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakCondition {
    #[serde(default)]
    pub operator: ChainOperator,
    #[serde(default)]
    pub priority: Option<i32>,
    pub required_streak_length: i32,
    /// "daily", "weekly", "exercise", "perfect_score"
    #[serde(default)]
    pub streak_type: Option<String>,
    #[serde(default)]
    pub minimum_activity_per_day: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCondition {
    #[serde(default)]
    pub operator: ChainOperator,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_time_seconds: Option<i32>,
    #[serde(default)]
    pub min_time_seconds: Option<i32>,
    pub time_type: TimeScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCondition {
    #[serde(default)]
    pub operator: ChainOperator,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub minimum_score: Option<f64>,
    #[serde(default)]
    pub minimum_average: Option<f64>,
    #[serde(default)]
    pub minimum_attempts: Option<i32>,
    /// "score", "accuracy", "improvement"
    #[serde(default)]
    pub performance_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeCondition {
    #[serde(default)]
    pub operator: ChainOperator,
    #[serde(default)]
    pub priority: Option<i32>,
    pub logical_operator: LogicalOperator,
    pub sub_conditions: Vec<RuleCondition>,
}

/// Closed sum over the condition variants, keyed by the `conditionType`
/// discriminator string of the wire format.
#[derive(Debug, Clone)]
pub enum RuleCondition {
    Exercise(ExerciseCondition),
    Streak(StreakCondition),
    Time(TimeCondition),
    Performance(PerformanceCondition),
    Composite(CompositeCondition),
    Unknown { condition_type: String },
}

impl RuleCondition {
    pub fn condition_type(&self) -> &str {
        match self {
            Self::Exercise(_) => "EXERCISE",
            Self::Streak(_) => "STREAK",
            Self::Time(_) => "TIME",
            Self::Performance(_) => "PERFORMANCE",
            Self::Composite(_) => "COMPOSITE",
            Self::Unknown { condition_type } => condition_type,
        }
    }

    pub fn operator(&self) -> ChainOperator {
        match self {
            Self::Exercise(c) => c.operator,
            Self::Streak(c) => c.operator,
            Self::Time(c) => c.operator,
            Self::Performance(c) => c.operator,
            Self::Composite(c) => c.operator,
            Self::Unknown { .. } => ChainOperator::And,
        }
    }

    pub fn priority(&self) -> Option<i32> {
        match self {
            Self::Exercise(c) => c.priority,
            Self::Streak(c) => c.priority,
            Self::Time(c) => c.priority,
            Self::Performance(c) => c.priority,
            Self::Composite(c) => c.priority,
            Self::Unknown { .. } => None,
        }
    }

    fn validate(&self) -> Result<(), RuleSchemaError> {
        match self {
            Self::Exercise(c) if c.required_count <= 0 => {
                Err(RuleSchemaError::NonPositiveCount(c.required_count))
            }
            Self::Composite(c) => {
                if c.sub_conditions.is_empty() {
                    return Err(RuleSchemaError::EmptyComposite);
                }
                for sub in &c.sub_conditions {
                    sub.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Serialize for RuleCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (tag, body) = match self {
            Self::Exercise(c) => ("EXERCISE", serde_json::to_value(c)),
            Self::Streak(c) => ("STREAK", serde_json::to_value(c)),
            Self::Time(c) => ("TIME", serde_json::to_value(c)),
            Self::Performance(c) => ("PERFORMANCE", serde_json::to_value(c)),
            Self::Composite(c) => ("COMPOSITE", serde_json::to_value(c)),
            Self::Unknown { condition_type } => {
                (condition_type.as_str(), Ok(Value::Object(Default::default())))
            }
        };
        let body = body.map_err(|e| serde::ser::Error::custom(e.to_string()))?;
        let obj = body
            .as_object()
            .ok_or_else(|| serde::ser::Error::custom("condition body is not an object"))?;

        let mut map = serializer.serialize_map(Some(obj.len() + 1))?;
        map.serialize_entry("conditionType", tag)?;
        for (key, value) in obj.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let tag = value
            .get("conditionType")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("conditionType"))?
            .to_string();

        let parsed = match tag.as_str() {
            "EXERCISE" => serde_json::from_value(value).map(Self::Exercise),
            "STREAK" => serde_json::from_value(value).map(Self::Streak),
            "TIME" => serde_json::from_value(value).map(Self::Time),
            "PERFORMANCE" => serde_json::from_value(value).map(Self::Performance),
            "COMPOSITE" => serde_json::from_value(value).map(Self::Composite),
            _ => return Ok(Self::Unknown { condition_type: tag }),
        };
        parsed.map_err(|e| D::Error::custom(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Difficulty weight 1-10.
    #[serde(default)]
    pub difficulty: Option<i32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom_properties: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSchema {
    /// "1.x"
    pub version: String,
    pub rule_type: String,
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub metadata: Option<RuleMetadata>,
}

impl RuleSchema {
    /// Registration-time validation. A schema that fails here is rejected
    /// before it ever reaches the evaluator; existing rules keep operating.
    pub fn validate(&self) -> Result<(), RuleSchemaError> {
        if !is_supported_version(&self.version) {
            return Err(RuleSchemaError::InvalidVersion(self.version.clone()));
        }
        if self.conditions.is_empty() {
            return Err(RuleSchemaError::EmptyConditions);
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// Parses and validates a rule from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, RuleSchemaError> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }
}

fn is_supported_version(version: &str) -> bool {
    version
        .strip_prefix("1.")
        .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()))
}
