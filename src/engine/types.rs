use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    #[default]
    Easy,
    Medium,
    Hard,
    Expert,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Expert => "expert",
        }
    }

    /// One step up, saturating at Expert.
    pub fn step_up(&self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium => Self::Hard,
            _ => Self::Expert,
        }
    }

    /// One step down, saturating at Easy.
    pub fn step_down(&self) -> Self {
        match self {
            Self::Expert => Self::Hard,
            Self::Hard => Self::Medium,
            _ => Self::Easy,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ExerciseCompleted,
    StreakUpdated,
    LearningPointCompleted,
    StudySessionCompleted,
    PerformanceImproved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExerciseCompleted => "EXERCISE_COMPLETED",
            Self::StreakUpdated => "STREAK_UPDATED",
            Self::LearningPointCompleted => "LEARNING_POINT_COMPLETED",
            Self::StudySessionCompleted => "STUDY_SESSION_COMPLETED",
            Self::PerformanceImproved => "PERFORMANCE_IMPROVED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePayload {
    pub exercise_id: Option<i64>,
    pub learning_point_id: Option<i32>,
    pub exercise_type_id: Option<i32>,
    pub difficulty: DifficultyLevel,
    pub is_correct: bool,
    pub score: Option<f64>,
    pub time_spent_seconds: i32,
    pub estimated_duration_seconds: i32,
    pub hints_used: i32,
    pub attempt_number: Option<i32>,
}

impl Default for ExercisePayload {
    fn default() -> Self {
        Self {
            exercise_id: None,
            learning_point_id: None,
            exercise_type_id: None,
            difficulty: DifficultyLevel::Easy,
            is_correct: true,
            score: None,
            time_spent_seconds: 0,
            estimated_duration_seconds: 0,
            hints_used: 0,
            attempt_number: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakPayload {
    /// "daily", "weekly", "exercise", "perfect_score"
    pub streak_type: String,
    pub current_streak: i32,
    pub previous_streak: i32,
    #[serde(default)]
    pub is_new_record: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPointPayload {
    pub learning_point_id: i32,
    pub total_exercises_completed: i32,
    pub average_score: Option<f64>,
    pub total_time_spent_seconds: i32,
    /// "beginner", "intermediate", "advanced", "mastered"
    pub mastery_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub session_duration_minutes: i32,
    pub exercises_completed: i32,
    pub correct_answers: i32,
    pub incorrect_answers: i32,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementPayload {
    /// "accuracy", "speed", "consistency"
    pub improvement_type: String,
    pub previous_value: f64,
    pub current_value: f64,
    pub improvement_percentage: f64,
    /// "weekly", "monthly", "overall"
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    ExerciseCompleted(ExercisePayload),
    StreakUpdated(StreakPayload),
    LearningPointCompleted(LearningPointPayload),
    StudySessionCompleted(SessionPayload),
    PerformanceImproved(ImprovementPayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ExerciseCompleted(_) => EventKind::ExerciseCompleted,
            Self::StreakUpdated(_) => EventKind::StreakUpdated,
            Self::LearningPointCompleted(_) => EventKind::LearningPointCompleted,
            Self::StudySessionCompleted(_) => EventKind::StudySessionCompleted,
            Self::PerformanceImproved(_) => EventKind::PerformanceImproved,
        }
    }
}

/// Immutable fact about something a student did. Events are append-only and
/// ordered per student by (occurred_at, event_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub event_id: Uuid,
    pub student_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ActivityEvent {
    pub fn new(
        student_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            student_id: student_id.into(),
            occurred_at,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn ordering_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.occurred_at, self.event_id)
    }
}

/// One completed exercise attempt as retained in the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub is_correct: bool,
    pub time_spent_seconds: i32,
    pub estimated_duration_seconds: i32,
    pub difficulty: DifficultyLevel,
    pub score: Option<f64>,
    pub occurred_at: DateTime<Utc>,
}

/// Bounded per-student rolling buffer of recent attempts plus derived
/// counters. Created lazily on the first event; never exceeds the configured
/// window size; safe to rebuild from the durable event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentActivityWindow {
    pub student_id: String,
    pub attempts: VecDeque<AttemptRecord>,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    /// Current streak length per streak type ("daily", "weekly", ...).
    pub streaks: HashMap<String, u32>,
    pub per_difficulty_counts: HashMap<DifficultyLevel, u32>,
    pub learning_points_completed: u32,
    pub study_sessions_completed: u32,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_event_id: Option<Uuid>,
}

impl StudentActivityWindow {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            attempts: VecDeque::new(),
            total_attempts: 0,
            correct_attempts: 0,
            streaks: HashMap::new(),
            per_difficulty_counts: HashMap::new(),
            learning_points_completed: 0,
            study_sessions_completed: 0,
            last_event_at: None,
            last_event_id: None,
        }
    }

    /// All-time success rate from the monotone counters.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.correct_attempts as f64 / self.total_attempts as f64
    }

    /// Success rate over only the retained recent attempts. Evicted history
    /// does not weigh in, so the rate recovers as soon as performance does.
    pub fn recent_success_rate(&self) -> f64 {
        if self.attempts.is_empty() {
            return 0.0;
        }
        let correct = self.attempts.iter().filter(|a| a.is_correct).count();
        correct as f64 / self.attempts.len() as f64
    }

    /// Mean of time_spent / estimated_duration over the window. Attempts with
    /// no estimate contribute zero to the sum but still count in the divisor,
    /// matching the aggregate the difficulty thresholds were tuned on.
    pub fn avg_time_ratio(&self) -> f64 {
        if self.attempts.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .attempts
            .iter()
            .filter(|a| a.estimated_duration_seconds > 0)
            .map(|a| a.time_spent_seconds as f64 / a.estimated_duration_seconds as f64)
            .sum();
        sum / self.attempts.len() as f64
    }

    pub fn streak_length(&self, streak_type: &str) -> u32 {
        self.streaks.get(streak_type).copied().unwrap_or(0)
    }

    /// Difficulty of the most recent attempt, Easy when the window is empty.
    pub fn current_difficulty(&self) -> DifficultyLevel {
        self.attempts
            .back()
            .map(|a| a.difficulty)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Intermediate classification before mapping to a concrete difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifficultyVerdict {
    Increase,
    Decrease,
    Maintain,
    SlightIncrease,
}

impl DifficultyVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "INCREASE",
            Self::Decrease => "DECREASE",
            Self::Maintain => "MAINTAIN",
            Self::SlightIncrease => "SLIGHT_INCREASE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub level: DifficultyLevel,
    pub verdict: DifficultyVerdict,
    pub reason: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlockDecision {
    pub achievement_id: i64,
    pub rule_id: String,
    pub triggering_event_id: Uuid,
    /// Minimum leaf progress ratio across the rule's conditions, in [0, 1].
    pub completion_percentage: f64,
}

/// Persisted by the caller; at most one record per (student, achievement).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlockRecord {
    pub student_id: String,
    pub achievement_id: i64,
    pub unlocked_at: DateTime<Utc>,
    pub triggering_event_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn difficulty_steps_saturate() {
        assert_eq!(DifficultyLevel::Expert.step_up(), DifficultyLevel::Expert);
        assert_eq!(DifficultyLevel::Easy.step_down(), DifficultyLevel::Easy);
        assert_eq!(DifficultyLevel::Medium.step_up(), DifficultyLevel::Hard);
        assert_eq!(DifficultyLevel::Hard.step_down(), DifficultyLevel::Medium);
    }

    #[test]
    fn difficulty_is_totally_ordered() {
        assert!(DifficultyLevel::Easy < DifficultyLevel::Medium);
        assert!(DifficultyLevel::Medium < DifficultyLevel::Hard);
        assert!(DifficultyLevel::Hard < DifficultyLevel::Expert);
    }

    #[test]
    fn empty_window_rates_are_zero() {
        let window = StudentActivityWindow::new("s1");
        assert_eq!(window.success_rate(), 0.0);
        assert_eq!(window.recent_success_rate(), 0.0);
        assert_eq!(window.avg_time_ratio(), 0.0);
        assert_eq!(window.current_difficulty(), DifficultyLevel::Easy);
    }

    #[test]
    fn recent_rate_ignores_evicted_history() {
        let mut window = StudentActivityWindow::new("s1");
        // 4 old failures only survive in the counters.
        window.total_attempts = 6;
        window.correct_attempts = 2;
        for i in 0..2 {
            window.attempts.push_back(AttemptRecord {
                is_correct: true,
                time_spent_seconds: 100,
                estimated_duration_seconds: 100,
                difficulty: DifficultyLevel::Medium,
                score: None,
                occurred_at: Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
            });
        }

        assert_eq!(window.recent_success_rate(), 1.0);
        assert!((window.success_rate() - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = ActivityEvent::new(
            "s1",
            Utc::now(),
            EventPayload::ExerciseCompleted(ExercisePayload {
                difficulty: DifficultyLevel::Medium,
                is_correct: true,
                score: Some(92.0),
                time_spent_seconds: 120,
                estimated_duration_seconds: 150,
                ..Default::default()
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"EXERCISE_COMPLETED\""));
        let back: ActivityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.kind(), EventKind::ExerciseCompleted);
    }
}
