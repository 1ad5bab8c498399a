//! Pending state reports and their quiescence deadline
//!
//! The bridge actor owns one [`ReportDebouncer`]. Every push event enqueues a
//! unique id and pushes the deadline out by the debounce window; when the
//! deadline passes without further events the actor drains the set.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ReportDebouncer {
    window: Duration,
    pending: Vec<String>,
    deadline: Option<Instant>,
}

impl ReportDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Queue an id (no-op when already queued) and restart the window
    pub fn enqueue(&mut self, unique_id: &str) {
        if !self.pending.iter().any(|id| id == unique_id) {
            self.pending.push(unique_id.to_string());
        }
        self.deadline = Some(Instant::now() + self.window);
    }

    /// When the pending set should be flushed, if anything is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.filter(|_| !self.pending.is_empty())
    }

    /// Take the pending ids in enqueue order and clear the timer
    pub fn drain(&mut self) -> Vec<String> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_dedupes_and_extends_deadline() {
        let mut debouncer = ReportDebouncer::new(Duration::from_secs(1));
        assert_eq!(debouncer.deadline(), None);

        debouncer.enqueue("a");
        let first = debouncer.deadline().unwrap();
        tokio::time::advance(Duration::from_millis(600)).await;
        debouncer.enqueue("b");
        debouncer.enqueue("a");

        let second = debouncer.deadline().unwrap();
        assert_eq!(second - first, Duration::from_millis(600));
        assert!(second > Instant::now());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(second <= Instant::now());
        assert_eq!(debouncer.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(debouncer.is_empty());
        assert_eq!(debouncer.deadline(), None);
    }
}
