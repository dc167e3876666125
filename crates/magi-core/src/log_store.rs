//! Bounded, insertion-ordered event log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of retained entries.
pub const DEFAULT_CAPACITY: usize = 60;

/// Log entry severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Success,
    System,
}

impl Severity {
    /// Three-letter tag shown in the terminal feed.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Success => "OK",
            Self::System => "SYS",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One immutable log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// Wall-clock `HH:MM:SS`.
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
    pub localized_message: String,
}

/// FIFO ring of [`LogEntry`] values. Always holds the most recent
/// `capacity` entries, oldest first.
#[derive(Debug, Clone)]
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogStore {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Append a new entry with the next id and return a reference to it.
    pub fn append(
        &mut self,
        timestamp: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        localized_message: impl Into<String>,
    ) -> &LogEntry {
        let entry = LogEntry {
            id: self.next_id,
            timestamp: timestamp.into(),
            severity,
            message: message.into(),
            localized_message: localized_message.into(),
        };
        self.next_id += 1;

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> impl ExactSizeIterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries with an id strictly greater than `id`, oldest first.
    pub fn since(&self, id: Option<u64>) -> Vec<LogEntry> {
        match id {
            None => self.entries.iter().cloned().collect(),
            Some(id) => self
                .entries
                .iter()
                .filter(|e| e.id > id)
                .cloned()
                .collect(),
        }
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(store: &mut LogStore, n: usize) {
        for i in 0..n {
            store.append("00:00:00", Severity::Info, format!("msg-{i}"), "");
        }
    }

    #[test]
    fn retains_last_capacity_entries_in_order() {
        let mut store = LogStore::new(60);
        fill(&mut store, 150);
        assert_eq!(store.len(), 60);
        let msgs: Vec<_> = store.entries().map(|e| e.message.clone()).collect();
        let expected: Vec<_> = (90..150).map(|i| format!("msg-{i}")).collect();
        assert_eq!(msgs, expected);
    }

    #[test]
    fn ids_strictly_increase_without_gaps() {
        let mut store = LogStore::new(5);
        fill(&mut store, 12);
        let ids: Vec<_> = store.entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 8, 9, 10, 11]);
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let mut store = LogStore::default();
        fill(&mut store, 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
        assert_eq!(store.latest().map(|e| e.id), Some(2));
    }

    #[test]
    fn since_returns_newer_entries() {
        let mut store = LogStore::new(10);
        fill(&mut store, 6);
        let newer: Vec<_> = store.since(Some(3)).into_iter().map(|e| e.id).collect();
        assert_eq!(newer, vec![4, 5]);
        assert_eq!(store.since(None).len(), 6);
        assert!(store.since(Some(99)).is_empty());
    }

    #[test]
    fn zero_capacity_is_bumped() {
        let mut store = LogStore::new(0);
        fill(&mut store, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Success).unwrap();
        assert_eq!(json, "\"success\"");
        assert_eq!(Severity::Warn.prefix(), "WRN");
    }
}
