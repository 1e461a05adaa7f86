/// Cancellable debounce timer
///
/// Used by subscription consumers to coalesce bursts of change events into
/// a single notification: each event arms (or re-arms) the timer, and the
/// notification fires only after the burst goes quiet for the configured
/// window.

use std::future;
use tokio::time::{sleep_until, Duration, Instant};

/// A resettable one-shot timer
///
/// The timer is idle until [`touch`](Debouncer::touch) arms it. While
/// armed, [`fired`](Debouncer::fired) resolves once the window elapses;
/// while idle it is pending forever, which makes it safe to poll inside
/// `tokio::select!` alongside an event source.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Creates an idle debouncer with the given quiet window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arms the timer, or pushes an armed timer's deadline out again
    pub fn touch(&mut self) {
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Disarms the timer without firing
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True while the timer is armed
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the quiet window elapses; pending forever while idle
    ///
    /// Firing disarms the timer.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => future::pending().await,
        }
    }
}
