pub mod achievements;
pub mod aggregator;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod store;
pub mod types;

pub use achievements::{AchievementRuleEngine, RegisteredRule};
pub use aggregator::ActivityAggregator;
pub use config::EngineConfig;
pub use difficulty::DifficultyController;
pub use error::EngineError;
pub use store::WindowStore;
pub use types::*;
