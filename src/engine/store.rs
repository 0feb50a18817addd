//! Caller-owned keyed store of per-student windows.
//!
//! The core components take windows as explicit inputs and outputs; this
//! store exists so an ingestion service has a ready-made map that enforces
//! the single-writer-per-student discipline. Different students update in
//! parallel; updates to the same student serialize on that student's entry
//! lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::engine::aggregator::ActivityAggregator;
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::types::{ActivityEvent, StudentActivityWindow};

pub struct WindowStore {
    aggregator: ActivityAggregator,
    windows: RwLock<HashMap<String, Arc<Mutex<StudentActivityWindow>>>>,
}

impl WindowStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            aggregator: ActivityAggregator::new(config),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Applies an event under the student's entry lock and returns a snapshot
    /// of the updated window. The entry is created lazily on first use.
    pub fn update(&self, event: &ActivityEvent) -> Result<StudentActivityWindow, EngineError> {
        let entry = self.entry(&event.student_id);
        let mut window = entry.lock();
        let updated = self.aggregator.apply(&window, event)?;
        *window = updated.clone();
        Ok(updated)
    }

    /// Replaces the student's window with a fold over the raw event log.
    /// Used to recover from out-of-order delivery or after a restart.
    pub fn rebuild(&self, student_id: &str, events: &[ActivityEvent]) -> StudentActivityWindow {
        let entry = self.entry(student_id);
        let mut window = entry.lock();
        let rebuilt = self.aggregator.rebuild(student_id, events);
        *window = rebuilt.clone();
        rebuilt
    }

    /// Snapshot of a student's window, if one exists.
    pub fn window(&self, student_id: &str) -> Option<StudentActivityWindow> {
        let windows = self.windows.read();
        windows.get(student_id).map(|entry| entry.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }

    fn entry(&self, student_id: &str) -> Arc<Mutex<StudentActivityWindow>> {
        {
            let windows = self.windows.read();
            if let Some(entry) = windows.get(student_id) {
                return Arc::clone(entry);
            }
        }
        let mut windows = self.windows.write();
        Arc::clone(windows.entry(student_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(StudentActivityWindow::new(student_id)))
        }))
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
