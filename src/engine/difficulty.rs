//! Adaptive difficulty recommendation.
//!
//! A 4-state machine with hysteresis over the student's current difficulty:
//! success rate and average time ratio over the recent attempts classify
//! into a verdict (first match wins), the verdict moves the level at most
//! one step, and Easy/Expert saturate. Identical inputs always yield
//! identical output.

use crate::engine::config::EngineConfig;
use crate::engine::types::{
    Confidence, DifficultyLevel, DifficultyVerdict, Recommendation, StudentActivityWindow,
};

pub struct DifficultyController {
    config: EngineConfig,
}

impl DifficultyController {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// `current` is the student's difficulty level as stored by the caller;
    /// `StudentActivityWindow::current_difficulty` is a usable proxy when no
    /// stored level exists. Rates and confidence come from the retained
    /// attempts only, so old evicted history cannot pin the recommendation.
    pub fn recommend(
        &self,
        window: &StudentActivityWindow,
        current: DifficultyLevel,
    ) -> Recommendation {
        if window.attempts.is_empty() {
            return Recommendation {
                level: DifficultyLevel::Easy,
                verdict: DifficultyVerdict::Maintain,
                reason: "new student".to_string(),
                confidence: Confidence::Low,
            };
        }

        let success_rate = window.recent_success_rate();
        let time_ratio = window.avg_time_ratio();
        let verdict = self.classify(success_rate, time_ratio);

        let level = match verdict {
            DifficultyVerdict::Increase => current.step_up(),
            DifficultyVerdict::Decrease => current.step_down(),
            DifficultyVerdict::SlightIncrease => {
                if current == DifficultyLevel::Easy {
                    DifficultyLevel::Medium
                } else {
                    current
                }
            }
            DifficultyVerdict::Maintain => current,
        };

        let recommendation = Recommendation {
            level,
            verdict,
            reason: Self::reason_for(verdict).to_string(),
            confidence: self.confidence(window.attempts.len() as u32),
        };
        tracing::debug!(
            student_id = %window.student_id,
            success_rate,
            time_ratio,
            verdict = verdict.as_str(),
            level = recommendation.level.as_str(),
            "difficulty recommendation"
        );
        recommendation
    }

    /// Verdict precedence is fixed: increase, then decrease, then maintain.
    /// Boundaries are inclusive on both thresholds.
    fn classify(&self, success_rate: f64, time_ratio: f64) -> DifficultyVerdict {
        let t = &self.config.difficulty;
        if success_rate >= t.increase_success_rate && time_ratio <= t.increase_time_ratio {
            DifficultyVerdict::Increase
        } else if success_rate <= t.decrease_success_rate || time_ratio >= t.decrease_time_ratio {
            DifficultyVerdict::Decrease
        } else if success_rate >= t.maintain_success_rate && time_ratio <= t.maintain_time_ratio {
            DifficultyVerdict::Maintain
        } else {
            DifficultyVerdict::SlightIncrease
        }
    }

    fn confidence(&self, recent_attempts: u32) -> Confidence {
        let bands = &self.config.confidence;
        if recent_attempts >= bands.high_attempts {
            Confidence::High
        } else if recent_attempts >= bands.medium_attempts {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    fn reason_for(verdict: DifficultyVerdict) -> &'static str {
        match verdict {
            DifficultyVerdict::Increase => "excellent performance - increasing difficulty",
            DifficultyVerdict::Decrease => "struggling detected - decreasing difficulty",
            DifficultyVerdict::Maintain => "stable performance - maintaining level",
            DifficultyVerdict::SlightIncrease => "gradual progress - slight adjustment",
        }
    }
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
