use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{merge::merge, timed_buffer::TimedBuffer};

/// History of one channel. Partial updates are merged into a running value
/// and every buffered entry is the complete value at that point in time.
pub struct StatefulBuffer {
    current: Option<Arc<Value>>,
    buffer: TimedBuffer<Arc<Value>>,
}

impl StatefulBuffer {
    pub fn new(buffer: TimedBuffer<Arc<Value>>) -> Self {
        Self {
            current: None,
            buffer,
        }
    }

    /// `null` clears the channel to an empty object.
    pub fn push(&mut self, update: Value) {
        let merged = match update {
            Value::Null => Value::Object(Map::new()),
            update => {
                let base = self
                    .current
                    .take()
                    .map(Arc::unwrap_or_clone)
                    .unwrap_or_else(|| Value::Object(Map::new()));
                merge(base, update)
            }
        };

        let merged = Arc::new(merged);
        self.current = Some(merged.clone());
        self.buffer.push(merged);
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_deref()
    }

    pub fn latest(&self) -> Option<Arc<Value>> {
        self.buffer.latest()
    }

    pub fn delayed(&self, target: i64) -> Option<Arc<Value>> {
        self.buffer.delayed(target)
    }

    pub fn cleanup(&mut self, before: i64) {
        self.buffer.cleanup(before)
    }

    pub fn max_delay(&self) -> i64 {
        self.buffer.max_delay()
    }
}
