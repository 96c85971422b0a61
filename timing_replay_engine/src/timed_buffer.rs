use std::{collections::VecDeque, sync::Arc, time::Duration};

use crate::clock::Clock;

#[derive(Clone, Debug)]
struct TimedEntry<T> {
    value: T,
    timestamp: i64,
}

/// Append-only history of values keyed by arrival time (epoch ms).
///
/// Entries stay sorted because callers only ever push non-decreasing
/// timestamps; the buffer does not check this.
pub struct TimedBuffer<T> {
    entries: VecDeque<TimedEntry<T>>,
    clock: Arc<dyn Clock>,
    retention: Option<Duration>,
}

impl<T: Clone> TimedBuffer<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: VecDeque::new(),
            clock,
            retention: None,
        }
    }

    /// Like `new`, but every push also trims history older than `retention`.
    pub fn with_retention(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            retention: Some(retention),
            ..Self::new(clock)
        }
    }

    pub fn push(&mut self, value: T) {
        let now = self.clock.now_ms();
        self.push_timed(value, now);
    }

    pub fn push_timed(&mut self, value: T, timestamp: i64) {
        self.entries.push_back(TimedEntry { value, timestamp });

        if let Some(retention) = self.retention {
            let window = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
            self.cleanup(self.clock.now_ms().saturating_sub(window));
        }
    }

    pub fn latest(&self) -> Option<T> {
        self.entries.back().map(|e| e.value.clone())
    }

    /// Value of the newest entry at or before `target`.
    pub fn delayed(&self, target: i64) -> Option<T> {
        self.boundary(target).map(|i| self.entries[i].value.clone())
    }

    /// Drops everything older than the entry `delayed(before)` would return,
    /// keeping that entry so instants at or after `before` stay answerable.
    pub fn cleanup(&mut self, before: i64) {
        if let Some(i) = self.boundary(before) {
            self.entries.drain(..i);
        }
    }

    /// How far back (ms) a delayed query can currently reach; 0 when empty.
    pub fn max_delay(&self) -> i64 {
        self.entries
            .front()
            .map(|oldest| (self.clock.now_ms() - oldest.timestamp).max(0))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn boundary(&self, target: i64) -> Option<usize> {
        self.entries
            .partition_point(|e| e.timestamp <= target)
            .checked_sub(1)
    }
}
