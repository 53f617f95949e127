//! Operator event log
//!
//! A bounded, newest-first record of state changes kept for dashboards.
//! Nothing in the vault reads it back; every entry is also forwarded to
//! `tracing`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
}

pub struct EventLog {
    capacity: usize,
    /// Newest at the front
    entries: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            EventLevel::Info => tracing::info!(target: "chunkvault::events", "{}", message),
            EventLevel::Warning => tracing::warn!(target: "chunkvault::events", "{}", message),
            EventLevel::Error => tracing::error!(target: "chunkvault::events", "{}", message),
        }

        let mut entries = self.entries.lock();
        entries.push_front(Event {
            timestamp: Utc::now(),
            level,
            message,
        });
        entries.truncate(self.capacity);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(EventLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(EventLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(EventLevel::Error, message);
    }

    /// Up to `limit` most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
