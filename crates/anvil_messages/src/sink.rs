//! Thread-safe message accumulator for one build session.

use crate::category::MessageCategory;
use crate::message::BuildMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A thread-safe accumulator for build messages.
///
/// Backends run on a worker thread while callers consume messages from
/// another, so the sink is the single-writer fan-out-readers queue of one
/// session. Error and warning counts are tracked atomically for fast checks
/// without locking the message vector.
pub struct MessageSink {
    messages: Mutex<Vec<BuildMessage>>,
    error_count: AtomicUsize,
    warning_count: AtomicUsize,
}

impl MessageSink {
    /// Creates a new empty message sink.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            error_count: AtomicUsize::new(0),
            warning_count: AtomicUsize::new(0),
        }
    }

    /// Adds a message to the sink.
    pub fn add(&self, message: BuildMessage) {
        match message.category {
            MessageCategory::Error => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }
            MessageCategory::Warning => {
                self.warning_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        let mut messages = self.messages.lock().unwrap();
        messages.push(message);
    }

    /// Returns `true` if any error messages have been added.
    pub fn has_errors(&self) -> bool {
        self.error_count.load(Ordering::Relaxed) > 0
    }

    /// Returns the number of error messages added so far.
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Returns the number of warning messages added so far.
    pub fn warning_count(&self) -> usize {
        self.warning_count.load(Ordering::Relaxed)
    }

    /// Counts messages in the given category.
    pub fn count(&self, category: MessageCategory) -> usize {
        match category {
            MessageCategory::Error => self.error_count(),
            MessageCategory::Warning => self.warning_count(),
            _ => {
                let messages = self.messages.lock().unwrap();
                messages.iter().filter(|m| m.category == category).count()
            }
        }
    }

    /// Takes all accumulated messages, leaving the sink empty.
    ///
    /// The atomic counters are not reset; they reflect the whole session.
    pub fn take_all(&self) -> Vec<BuildMessage> {
        let mut messages = self.messages.lock().unwrap();
        std::mem::take(&mut *messages)
    }

    /// Returns a snapshot of all accumulated messages without draining.
    pub fn messages(&self) -> Vec<BuildMessage> {
        let messages = self.messages.lock().unwrap();
        messages.clone()
    }
}

impl Default for MessageSink {
    fn default() -> Self {
        Self::new()
    }
}
