//! `BackupResult` and the bounded run-history ring buffer (§3, §4.3).

use std::collections::VecDeque;

use qvault_core::constants::SCHEDULE_HISTORY_CAPACITY;
use qvault_core::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupResult {
    pub scheduled_time: Timestamp,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub success: bool,
    pub attempt: u32,
    pub will_retry: bool,
    pub error: Option<String>,
}

/// Bounded to the most recent `SCHEDULE_HISTORY_CAPACITY` entries; guarded
/// only across individual pushes (§5 "the scheduler's history ring buffer
/// is guarded by a mutex held only across pushes").
#[derive(Clone, Debug, Default)]
pub struct History {
    entries: VecDeque<BackupResult>,
}

impl History {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(SCHEDULE_HISTORY_CAPACITY) }
    }

    pub fn push(&mut self, result: BackupResult) {
        if self.entries.len() >= SCHEDULE_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn entries(&self) -> Vec<BackupResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(scheduled_time: Timestamp, success: bool) -> BackupResult {
        BackupResult {
            scheduled_time,
            start_time: scheduled_time,
            end_time: scheduled_time + 1,
            success,
            attempt: 1,
            will_retry: false,
            error: None,
        }
    }

    #[test]
    fn history_is_bounded_and_drops_oldest() {
        let mut history = History::new();
        for i in 0..(SCHEDULE_HISTORY_CAPACITY + 10) {
            history.push(result(i as i64, true));
        }
        assert_eq!(history.len(), SCHEDULE_HISTORY_CAPACITY);
        let oldest = history.entries().first().unwrap().scheduled_time;
        assert_eq!(oldest, 10);
    }
}
