use std::collections::VecDeque;

use super::event::{IntegrityEvent, TelemetryEntry};
use super::metrics::{compute_summary, TelemetrySummary};

const MAX_EVENTS: usize = 10_000;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<TelemetryEntry>,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn record(&mut self, at_ms: u64, event: IntegrityEvent) {
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(TelemetryEntry { at_ms, event });
    }

    pub fn entries(&self) -> impl Iterator<Item = &TelemetryEntry> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn summary(&self) -> TelemetrySummary {
        // Delegate to pure functional metrics module
        compute_summary(&self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
