use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyThresholds {
    pub increase_success_rate: f64,
    pub increase_time_ratio: f64,
    pub decrease_success_rate: f64,
    pub decrease_time_ratio: f64,
    pub maintain_success_rate: f64,
    pub maintain_time_ratio: f64,
}

impl Default for DifficultyThresholds {
    fn default() -> Self {
        Self {
            increase_success_rate: 0.8,
            increase_time_ratio: 1.2,
            decrease_success_rate: 0.4,
            decrease_time_ratio: 2.0,
            maintain_success_rate: 0.6,
            maintain_time_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub high_attempts: u32,
    pub medium_attempts: u32,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            high_attempts: 8,
            medium_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of recent attempts retained per student.
    pub window_size: usize,
    /// Events older than the last applied event by more than this are
    /// rejected as out of order.
    pub out_of_order_grace_seconds: i64,
    pub difficulty: DifficultyThresholds,
    pub confidence: ConfidenceBands,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            out_of_order_grace_seconds: 60,
            difficulty: DifficultyThresholds::default(),
            confidence: ConfidenceBands::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROGRESSION_WINDOW_SIZE") {
            if let Ok(size) = val.parse() {
                config.window_size = size;
            }
        }
        if let Ok(val) = std::env::var("PROGRESSION_GRACE_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.out_of_order_grace_seconds = secs;
            }
        }

        config
    }
}
