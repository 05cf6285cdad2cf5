//! Bounded diagnostic ring buffer.
//!
//! Every public session operation records exactly one entry here, success or
//! failure. The log is diagnostic only and never affects behavior; when full,
//! the oldest entry is evicted.

use log::debug;
use std::collections::VecDeque;

/// Default number of entries kept before eviction starts.
pub const DEFAULT_LOCAL_LOG_CAPACITY: usize = 50;

/// Fixed-capacity ring buffer of structured call records.
#[derive(Debug)]
pub struct LocalLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl LocalLog {
    /// Create a log holding at most `capacity` entries (floor of 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one entry, evicting the oldest if the log is full.
    pub fn record(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        debug!("{entry}");
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained entries, oldest first.
    pub fn dump(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for LocalLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_dump_order() {
        let mut log = LocalLog::new(10);
        log.record("first");
        log.record("second");
        assert_eq!(log.dump(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut log = LocalLog::new(3);
        for i in 0..5 {
            log.record(format!("entry {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.dump(),
            vec![
                "entry 2".to_string(),
                "entry 3".to_string(),
                "entry 4".to_string()
            ]
        );
    }

    #[test]
    fn test_zero_capacity_floors_to_one() {
        let mut log = LocalLog::new(0);
        log.record("only");
        log.record("kept");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.dump(), vec!["kept".to_string()]);
    }
}
