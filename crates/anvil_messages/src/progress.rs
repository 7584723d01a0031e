//! Progress reporting and cancellation for long-running build work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Progress state and cancellation signal for one build session.
///
/// The indicator is the single cancellation signal of a session: scans and
/// backend loops poll [`is_cancelled`](Self::is_cancelled) at item
/// granularity and stop early, leaving caches in their last-committed state.
/// Cancellation never commits partial work.
///
/// Safe to share across threads; text and fraction updates are delivered to
/// readers on other threads.
pub struct ProgressIndicator {
    cancelled: AtomicBool,
    state: Mutex<ProgressState>,
}

#[derive(Clone, Default)]
struct ProgressState {
    text: String,
    fraction: f64,
}

impl ProgressIndicator {
    /// Creates a fresh, not-cancelled indicator.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// Requests cancellation of the session this indicator belongs to.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Sets the current progress text.
    pub fn set_text(&self, text: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.text = text.into();
    }

    /// Returns the current progress text.
    pub fn text(&self) -> String {
        self.state.lock().unwrap().text.clone()
    }

    /// Sets the completed fraction, clamped to `0.0..=1.0`.
    pub fn set_fraction(&self, fraction: f64) {
        let mut state = self.state.lock().unwrap();
        state.fraction = fraction.clamp(0.0, 1.0);
    }

    /// Returns the completed fraction.
    pub fn fraction(&self) -> f64 {
        self.state.lock().unwrap().fraction
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_cancelled() {
        let progress = ProgressIndicator::new();
        assert!(!progress.is_cancelled());
    }

    #[test]
    fn cancel_is_sticky() {
        let progress = ProgressIndicator::new();
        progress.cancel();
        assert!(progress.is_cancelled());
        assert!(progress.is_cancelled());
    }

    #[test]
    fn text_updates() {
        let progress = ProgressIndicator::new();
        assert_eq!(progress.text(), "");
        progress.set_text("scanning sources");
        assert_eq!(progress.text(), "scanning sources");
    }

    #[test]
    fn fraction_clamped() {
        let progress = ProgressIndicator::new();
        progress.set_fraction(0.5);
        assert_eq!(progress.fraction(), 0.5);
        progress.set_fraction(2.0);
        assert_eq!(progress.fraction(), 1.0);
        progress.set_fraction(-1.0);
        assert_eq!(progress.fraction(), 0.0);
    }

    #[test]
    fn cancel_visible_across_threads() {
        use std::sync::Arc;
        use std::thread;

        let progress = Arc::new(ProgressIndicator::new());
        let observer = Arc::clone(&progress);
        let handle = thread::spawn(move || {
            while !observer.is_cancelled() {
                thread::yield_now();
            }
            true
        });
        progress.cancel();
        assert!(handle.join().unwrap());
    }
}
