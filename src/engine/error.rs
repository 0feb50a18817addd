use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Recoverable; the caller may rebuild the student's window from the
    /// durable event log and retry.
    #[error("out-of-order event {event_id} for student {student_id}: occurred at {occurred_at}, window already at {last_event_at}")]
    OutOfOrderEvent {
        student_id: String,
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        last_event_at: DateTime<Utc>,
    },
}
