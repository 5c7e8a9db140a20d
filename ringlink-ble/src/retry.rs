//! Reconnect policy for the stream command

use std::time::Duration;

use tokio::time::Instant;

use ringlink_session::SessionState;

/// Schedules a reconnect after each `Disconnected`; a newer schedule replaces
/// the older one. A scheduled reconnect only fires if the session is still
/// down (disconnected or idle) at that point.
#[derive(Debug)]
pub struct Reconnect {
    enabled: bool,
    delay: Duration,
    due: Option<Instant>,
}

impl Reconnect {
    pub fn new(enabled: bool, delay: Duration) -> Self {
        Self {
            enabled,
            delay,
            due: None,
        }
    }

    /// Called on user stop
    pub fn disable(&mut self) {
        self.enabled = false;
        self.due = None;
    }

    pub fn observe(&mut self, state: SessionState, now: Instant) {
        if self.enabled && state == SessionState::Disconnected {
            self.due = Some(now + self.delay);
        }
    }

    pub fn due(&self) -> Option<Instant> {
        self.due
    }

    /// Consume the schedule; `true` if the reconnect should happen
    pub fn fire(&mut self, last_state: Option<SessionState>) -> bool {
        self.due.take().is_some() && self.enabled && last_state.is_some_and(|s| s.is_down())
    }
}
