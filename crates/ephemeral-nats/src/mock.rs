//! In-memory test doubles for the side channel.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::log_level::{Level, LogLevelControl};
use crate::messaging::Publish;

/// Captured publish: (full subject string, JSON value of the message)
pub type CapturedMessage = (String, serde_json::Value);

/// Publisher that records every message instead of sending it.
#[derive(Clone)]
pub struct MockPublisher {
    prefix: String,
    messages: Arc<Mutex<Vec<CapturedMessage>>>,
    attempts: Arc<AtomicUsize>,
    failing: Range<usize>,
}

impl MockPublisher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            messages: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            failing: 0..0,
        }
    }

    /// Fail the publish attempts whose zero-based index falls in `attempts`.
    pub fn failing_attempts(mut self, attempts: Range<usize>) -> Self {
        self.failing = attempts;
        self
    }

    /// Publish calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Captured (subject, value) pairs in publish order.
    pub fn published_messages(&self) -> Vec<CapturedMessage> {
        self.lock().clone()
    }

    pub fn message_count(&self) -> usize {
        self.lock().len()
    }
}

impl Publish for MockPublisher {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn publish<T: Serialize + Sync>(&self, subject: &str, message: &T) -> Result<()> {
        let value = serde_json::to_value(message)?;
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&attempt) {
            return Err(Error::Publish(format!("mock publish to {} refused", subject)));
        }
        self.lock().push((subject.to_string(), value));
        Ok(())
    }
}

/// Level control backed by a plain value. Counts how often a level was applied.
#[derive(Clone)]
pub struct MockLevelControl {
    level: Arc<Mutex<Level>>,
    applied: Arc<AtomicUsize>,
}

impl MockLevelControl {
    pub fn new(level: Level) -> Self {
        Self {
            level: Arc::new(Mutex::new(level)),
            applied: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

impl LogLevelControl for MockLevelControl {
    fn current(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, level: Level) -> Result<()> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
