//! Sliding admission window

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Dispatch-start timestamps inside the trailing window
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    limit: usize,
    starts: VecDeque<Instant>,
}

/// Outcome of asking the window for room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// This many dispatches may start now
    Open(usize),

    /// Window is full, the oldest start ages out after this long
    Full(Duration),
}

impl RateWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            window,
            limit: limit as usize,
            starts: VecDeque::new(),
        }
    }

    /// Drop starts that are `window` or more in the past
    pub fn prune(&mut self, now: Instant) {
        while self
            .starts
            .front()
            .map(|t| now.saturating_duration_since(*t) >= self.window)
            .unwrap_or(false)
        {
            self.starts.pop_front();
        }
    }

    /// Prune, then report how many starts are admissible at `now`
    pub fn admission(&mut self, now: Instant) -> Admission {
        self.prune(now);
        match self.starts.front() {
            Some(oldest) if self.starts.len() >= self.limit => {
                let age = now.saturating_duration_since(*oldest);
                Admission::Full(self.window.saturating_sub(age))
            }
            _ => Admission::Open(self.limit.saturating_sub(self.starts.len())),
        }
    }

    /// Record a dispatch start
    pub fn record(&mut self, at: Instant) {
        // Batch members can finish their stagger out of order
        let pos = self.starts.iter().rposition(|t| *t <= at).map(|i| i + 1).unwrap_or(0);
        self.starts.insert(pos, at);
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}
