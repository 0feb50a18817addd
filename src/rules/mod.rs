pub mod evaluator;
pub mod migration;
pub mod schema;

pub use evaluator::{ConditionEvaluator, ConditionOutcome, RuleEvaluation};
pub use migration::{translate_legacy_rule, LegacyRuleTranslator};
pub use schema::{RuleCondition, RuleSchema, RuleSchemaError};
