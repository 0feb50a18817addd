//! Rule evaluation scenarios over realistic event histories, including the
//! wire-format JSON the admin tooling registers.

use chrono::{TimeZone, Utc};
use progression_engine::engine::aggregator::ActivityAggregator;
use progression_engine::engine::types::{
    ActivityEvent, DifficultyLevel, EventPayload, ExercisePayload, StreakPayload,
    StudentActivityWindow,
};
use progression_engine::rules::evaluator::ConditionEvaluator;
use progression_engine::rules::schema::RuleSchema;

const BASE_TS: i64 = 1_700_000_000;

fn exercise_at(
    student: &str,
    seq: i64,
    difficulty: DifficultyLevel,
    correct: bool,
    score: f64,
) -> ActivityEvent {
    ActivityEvent::new(
        student,
        Utc.timestamp_opt(BASE_TS + seq * 3600, 0).unwrap(),
        EventPayload::ExerciseCompleted(ExercisePayload {
            difficulty,
            is_correct: correct,
            score: Some(score),
            time_spent_seconds: 100,
            estimated_duration_seconds: 120,
            ..Default::default()
        }),
    )
}

fn streak_at(student: &str, seq: i64, streak_type: &str, length: i32) -> ActivityEvent {
    ActivityEvent::new(
        student,
        Utc.timestamp_opt(BASE_TS + seq * 3600, 0).unwrap(),
        EventPayload::StreakUpdated(StreakPayload {
            streak_type: streak_type.to_string(),
            current_streak: length,
            previous_streak: length - 1,
            is_new_record: false,
        }),
    )
}

fn build(student: &str, events: &[ActivityEvent]) -> StudentActivityWindow {
    ActivityAggregator::default().rebuild(student, events)
}

fn easy_grinder_rule() -> RuleSchema {
    RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "EXERCISE_COMPLETION",
            "conditions": [{
                "conditionType": "EXERCISE",
                "operator": "AND",
                "priority": 1,
                "requiredCount": 10,
                "difficulty": "easy",
                "minimumAccuracy": 80.0
            }]
        }"#,
    )
    .expect("valid rule")
}

#[test]
fn exercise_rule_passes_at_full_count_and_accuracy() {
    // 10 easy completions, 9 correct: 90% accuracy
    let events: Vec<ActivityEvent> = (0..10)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Easy, i > 0, 85.0))
        .collect();
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&easy_grinder_rule(), &window, &events);
    assert!(evaluation.passed);
    assert_eq!(evaluation.completion, 1.0);
    assert!(evaluation.failure_reason.is_none());
}

#[test]
fn exercise_rule_reports_partial_progress() {
    // Only 7 qualifying easy completions; hard ones don't count.
    let mut events: Vec<ActivityEvent> = (0..7)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Easy, true, 90.0))
        .collect();
    events.extend((7..10).map(|i| exercise_at("s1", i, DifficultyLevel::Hard, true, 90.0)));
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&easy_grinder_rule(), &window, &events);
    assert!(!evaluation.passed);
    assert!((evaluation.completion - 0.7).abs() < 1e-9);
    assert!(evaluation.failure_reason.is_some());
}

#[test]
fn accuracy_gate_fails_despite_sufficient_count() {
    // 10 easy completions but only 6 correct: 60% < 80%
    let events: Vec<ActivityEvent> = (0..10)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Easy, i < 6, 60.0))
        .collect();
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&easy_grinder_rule(), &window, &events);
    assert!(!evaluation.passed);
    assert!(evaluation.completion < 1.0);
}

#[test]
fn composite_none_passes_when_all_subconditions_fail() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "ANTI_STREAK",
            "conditions": [{
                "conditionType": "COMPOSITE",
                "operator": "AND",
                "logicalOperator": "NONE",
                "subConditions": [
                    {"conditionType": "STREAK", "operator": "AND", "requiredStreakLength": 30, "streakType": "daily"},
                    {"conditionType": "STREAK", "operator": "AND", "requiredStreakLength": 10, "streakType": "weekly"}
                ]
            }]
        }"#,
    )
    .unwrap();

    let events = vec![streak_at("s1", 0, "daily", 2)];
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed);
}

#[test]
fn composite_any_short_circuits_in_priority_order() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "EITHER_STREAK",
            "conditions": [{
                "conditionType": "COMPOSITE",
                "operator": "AND",
                "logicalOperator": "ANY",
                "subConditions": [
                    {"conditionType": "STREAK", "operator": "AND", "priority": 2, "requiredStreakLength": 30, "streakType": "daily"},
                    {"conditionType": "STREAK", "operator": "AND", "priority": 1, "requiredStreakLength": 3, "streakType": "daily"}
                ]
            }]
        }"#,
    )
    .unwrap();

    let events = vec![streak_at("s1", 0, "daily", 5)];
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed);
    // Priority 1 evaluated first and satisfied ANY, so the 30-day condition
    // was never evaluated.
    assert_eq!(evaluation.outcomes[0].children.len(), 1);
}

#[test]
fn unknown_condition_fails_closed_without_aborting_siblings() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "MIXED",
            "conditions": [
                {"conditionType": "TELEPATHY", "operator": "AND"},
                {"conditionType": "STREAK", "operator": "OR", "requiredStreakLength": 3, "streakType": "daily"}
            ]
        }"#,
    )
    .unwrap();

    let events = vec![streak_at("s1", 0, "daily", 5)];
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    // false OR true: the sibling streak condition was still evaluated and
    // rescues the rule under the left-to-right scan.
    assert!(evaluation.passed);
    assert!(!evaluation.outcomes[0].passed);
    assert!(evaluation.outcomes[1].passed);
    assert!(evaluation.outcomes[0].description.contains("unsupported"));
}

#[test]
fn top_level_not_negates_only_the_following_condition() {
    // streak(3) satisfied AND NOT streak(30): passes while the long streak
    // is still out of reach.
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "EARLY_BIRD",
            "conditions": [
                {"conditionType": "STREAK", "operator": "AND", "requiredStreakLength": 3, "streakType": "daily"},
                {"conditionType": "STREAK", "operator": "NOT", "requiredStreakLength": 30, "streakType": "daily"}
            ]
        }"#,
    )
    .unwrap();

    let evaluator = ConditionEvaluator::new();

    let short = vec![streak_at("s1", 0, "daily", 5)];
    let window = build("s1", &short);
    assert!(evaluator.evaluate_rule(&rule, &window, &short).passed);

    let long = vec![streak_at("s1", 0, "daily", 31)];
    let window = build("s1", &long);
    assert!(!evaluator.evaluate_rule(&rule, &window, &long).passed);
}

#[test]
fn left_to_right_scan_has_no_precedence_climbing() {
    // A=false, B=true, C=false with "A OR B AND C":
    // standard precedence would give A OR (B AND C) = false,
    // the scan gives (A OR B) AND C = false... choose values where they
    // differ: A=true, B=false, C=true under "A AND B OR C":
    // precedence: A AND (B OR C) = true; scan: (A AND B) OR C = true.
    // Use A=false, B=false, C=true with "A AND B OR C":
    // precedence A AND (B OR C) = false; scan (A AND B) OR C = true.
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "SCAN_ORDER",
            "conditions": [
                {"conditionType": "STREAK", "operator": "AND", "requiredStreakLength": 100, "streakType": "daily"},
                {"conditionType": "STREAK", "operator": "AND", "requiredStreakLength": 100, "streakType": "weekly"},
                {"conditionType": "STREAK", "operator": "OR", "requiredStreakLength": 2, "streakType": "daily"}
            ]
        }"#,
    )
    .unwrap();

    let events = vec![streak_at("s1", 0, "daily", 5)];
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed, "scan is (A AND B) OR C, not A AND (B OR C)");
}

#[test]
fn time_condition_average_bound() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "SPEED_RUN",
            "conditions": [{
                "conditionType": "TIME",
                "operator": "AND",
                "maxTimeSeconds": 110,
                "timeType": "average"
            }]
        }"#,
    )
    .unwrap();

    // All attempts take 100s: average 100 <= 110.
    let events: Vec<ActivityEvent> = (0..5)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Medium, true, 80.0))
        .collect();
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed);
    // Boolean condition: contributes 1.0 when passed.
    assert_eq!(evaluation.completion, 1.0);
}

#[test]
fn time_condition_fails_on_empty_window() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "SPEED_RUN",
            "conditions": [{
                "conditionType": "TIME",
                "operator": "AND",
                "maxTimeSeconds": 60,
                "timeType": "per_exercise"
            }]
        }"#,
    )
    .unwrap();

    let window = StudentActivityWindow::new("s1");
    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &[]);
    assert!(!evaluation.passed);
}

#[test]
fn performance_score_rule_counts_qualifying_attempts() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "PERFECT_SCORE",
            "conditions": [{
                "conditionType": "PERFORMANCE",
                "operator": "AND",
                "minimumScore": 100.0,
                "minimumAttempts": 3,
                "performanceType": "score"
            }]
        }"#,
    )
    .unwrap();

    let mut events: Vec<ActivityEvent> = (0..3)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Medium, true, 100.0))
        .collect();
    events.push(exercise_at("s1", 3, DifficultyLevel::Medium, true, 90.0));
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed);

    // With only two perfect scores the rule reports 2/3 progress.
    let fewer = &events[1..];
    let window = build("s1", fewer);
    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, fewer);
    assert!(!evaluation.passed);
    assert!((evaluation.completion - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn time_frame_filter_anchors_on_event_history_not_wall_clock() {
    let rule = RuleSchema::from_json(
        r#"{
            "version": "1.0",
            "ruleType": "RECENT_GRIND",
            "conditions": [{
                "conditionType": "EXERCISE",
                "operator": "AND",
                "requiredCount": 3,
                "timeFrameDays": 1
            }]
        }"#,
    )
    .unwrap();

    // Three events within the last day of history, two older.
    let mut events: Vec<ActivityEvent> = (0..2)
        .map(|i| exercise_at("s1", i, DifficultyLevel::Easy, true, 90.0))
        .collect();
    events.extend((60..63).map(|i| exercise_at("s1", i, DifficultyLevel::Easy, true, 90.0)));
    let window = build("s1", &events);

    let evaluation = ConditionEvaluator::new().evaluate_rule(&rule, &window, &events);
    assert!(evaluation.passed);
    assert_eq!(evaluation.completion, 1.0);
}
