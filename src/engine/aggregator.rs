//! Per-student activity aggregation.
//!
//! `apply` is a pure function of (previous window, event): no hidden state,
//! no I/O, which makes replay from the event log deterministic. `rebuild`
//! is the reference fold over the raw log and must produce the same window
//! as applying the events one at a time.

use chrono::Duration;

use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::types::{
    ActivityEvent, AttemptRecord, EventPayload, StudentActivityWindow,
};

pub struct ActivityAggregator {
    config: EngineConfig,
}

impl ActivityAggregator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies one event to a student's window, returning the updated window.
    ///
    /// Rejects events whose `occurred_at` predates the last applied event by
    /// more than the configured grace period. Callers that want to accept such
    /// an event must rebuild the window from the log instead.
    pub fn apply(
        &self,
        window: &StudentActivityWindow,
        event: &ActivityEvent,
    ) -> Result<StudentActivityWindow, EngineError> {
        debug_assert_eq!(window.student_id, event.student_id);

        if let Some(last_event_at) = window.last_event_at {
            let grace = Duration::seconds(self.config.out_of_order_grace_seconds);
            if event.occurred_at + grace < last_event_at {
                return Err(EngineError::OutOfOrderEvent {
                    student_id: event.student_id.clone(),
                    event_id: event.event_id,
                    occurred_at: event.occurred_at,
                    last_event_at,
                });
            }
        }

        Ok(self.apply_unchecked(window, event))
    }

    /// Rebuilds a window from scratch by folding the raw event log, sorted by
    /// (occurred_at, event_id). Ordering checks are skipped: the sort already
    /// establishes the canonical per-student order.
    pub fn rebuild(
        &self,
        student_id: &str,
        events: &[ActivityEvent],
    ) -> StudentActivityWindow {
        let mut ordered: Vec<&ActivityEvent> = events
            .iter()
            .filter(|e| e.student_id == student_id)
            .collect();
        ordered.sort_by_key(|e| e.ordering_key());

        let mut window = StudentActivityWindow::new(student_id);
        for event in ordered {
            window = self.apply_unchecked(&window, event);
        }
        window
    }

    fn apply_unchecked(
        &self,
        window: &StudentActivityWindow,
        event: &ActivityEvent,
    ) -> StudentActivityWindow {
        let mut next = window.clone();

        match &event.payload {
            EventPayload::ExerciseCompleted(p) => {
                next.attempts.push_back(AttemptRecord {
                    is_correct: p.is_correct,
                    time_spent_seconds: p.time_spent_seconds,
                    estimated_duration_seconds: p.estimated_duration_seconds,
                    difficulty: p.difficulty,
                    score: p.score,
                    occurred_at: event.occurred_at,
                });
                while next.attempts.len() > self.config.window_size {
                    next.attempts.pop_front();
                }
                next.total_attempts += 1;
                if p.is_correct {
                    next.correct_attempts += 1;
                }
                *next.per_difficulty_counts.entry(p.difficulty).or_insert(0) += 1;
            }
            EventPayload::StreakUpdated(p) => {
                next.streaks
                    .insert(p.streak_type.clone(), p.current_streak.max(0) as u32);
            }
            EventPayload::LearningPointCompleted(_) => {
                next.learning_points_completed += 1;
            }
            EventPayload::StudySessionCompleted(_) => {
                next.study_sessions_completed += 1;
            }
            EventPayload::PerformanceImproved(_) => {}
        }

        next.last_event_at = Some(event.occurred_at);
        next.last_event_id = Some(event.event_id);
        next
    }
}

impl Default for ActivityAggregator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{DifficultyLevel, EventPayload, ExercisePayload, StreakPayload};
    use chrono::{TimeZone, Utc};

    fn exercise_event(student: &str, ts_secs: i64, correct: bool) -> ActivityEvent {
        ActivityEvent::new(
            student,
            Utc.timestamp_opt(1_700_000_000 + ts_secs, 0).unwrap(),
            EventPayload::ExerciseCompleted(ExercisePayload {
                difficulty: DifficultyLevel::Medium,
                is_correct: correct,
                time_spent_seconds: 100,
                estimated_duration_seconds: 100,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn apply_updates_counters_and_window() {
        let agg = ActivityAggregator::default();
        let mut window = StudentActivityWindow::new("s1");

        for i in 0..4 {
            window = agg.apply(&window, &exercise_event("s1", i * 60, i % 2 == 0)).unwrap();
        }

        assert_eq!(window.total_attempts, 4);
        assert_eq!(window.correct_attempts, 2);
        assert_eq!(window.attempts.len(), 4);
        assert_eq!(
            window.per_difficulty_counts.get(&DifficultyLevel::Medium),
            Some(&4)
        );
    }

    #[test]
    fn window_never_exceeds_configured_size() {
        let config = EngineConfig {
            window_size: 3,
            ..Default::default()
        };
        let agg = ActivityAggregator::new(config);
        let mut window = StudentActivityWindow::new("s1");

        for i in 0..10 {
            window = agg.apply(&window, &exercise_event("s1", i * 60, true)).unwrap();
        }

        assert_eq!(window.attempts.len(), 3);
        // Counters are monotone even as the buffer evicts.
        assert_eq!(window.total_attempts, 10);
    }

    #[test]
    fn rejects_event_older_than_grace_period() {
        let agg = ActivityAggregator::default();
        let mut window = StudentActivityWindow::new("s1");
        window = agg.apply(&window, &exercise_event("s1", 1000, true)).unwrap();

        let stale = exercise_event("s1", 1000 - 120, true);
        let err = agg.apply(&window, &stale).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderEvent { .. }));
    }

    #[test]
    fn accepts_event_within_grace_period() {
        let agg = ActivityAggregator::default();
        let mut window = StudentActivityWindow::new("s1");
        window = agg.apply(&window, &exercise_event("s1", 1000, true)).unwrap();

        let slightly_late = exercise_event("s1", 1000 - 30, true);
        assert!(agg.apply(&window, &slightly_late).is_ok());
    }

    #[test]
    fn streak_updates_overwrite_per_type() {
        let agg = ActivityAggregator::default();
        let mut window = StudentActivityWindow::new("s1");

        let streak = |ts: i64, len: i32| {
            ActivityEvent::new(
                "s1",
                Utc.timestamp_opt(1_700_000_000 + ts, 0).unwrap(),
                EventPayload::StreakUpdated(StreakPayload {
                    streak_type: "daily".to_string(),
                    current_streak: len,
                    previous_streak: len - 1,
                    is_new_record: false,
                }),
            )
        };

        window = agg.apply(&window, &streak(0, 3)).unwrap();
        window = agg.apply(&window, &streak(60, 4)).unwrap();
        assert_eq!(window.streak_length("daily"), 4);
        assert_eq!(window.streak_length("weekly"), 0);
    }

    #[test]
    fn rebuild_sorts_by_occurred_at_then_event_id() {
        let agg = ActivityAggregator::default();
        let mut events = vec![
            exercise_event("s1", 300, true),
            exercise_event("s1", 0, false),
            exercise_event("s1", 600, true),
            exercise_event("s2", 100, true),
        ];
        events.reverse();

        let window = agg.rebuild("s1", &events);
        assert_eq!(window.total_attempts, 3);
        assert_eq!(window.correct_attempts, 2);
        assert_eq!(
            window.attempts.front().map(|a| a.is_correct),
            Some(false),
            "oldest attempt first"
        );
    }
}
