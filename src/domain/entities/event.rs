//! Append-only operational event log, surfaced to the Notifier and the
//! (out-of-scope) API/UI layer.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::Debug => "DEBUG",
            EventLevel::Info => "INFO",
            EventLevel::Success => "SUCCESS",
            EventLevel::Warning => "WARNING",
            EventLevel::Error => "ERROR",
            EventLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub category: String,
    pub message: String,
}

impl Event {
    pub fn new(level: EventLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Event {
            timestamp: Utc::now(),
            level,
            category: category.into(),
            message: message.into(),
        }
    }
}
