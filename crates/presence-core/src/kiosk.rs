//! Kiosk pause state.
//!
//! After a successful match the kiosk holds the confirmation on screen for
//! a fixed wall-clock duration and makes no recognition attempts, so one
//! presence in front of the camera produces one check-in.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PauseGate {
    duration: Duration,
    until: Option<Instant>,
    /// Name shown while paused.
    validated: Option<String>,
}

impl PauseGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
            validated: None,
        }
    }

    /// Enter the paused state for `name`, starting at `now`.
    pub fn pause(&mut self, name: &str, now: Instant) {
        self.until = Some(now + self.duration);
        self.validated = Some(name.to_string());
    }

    /// Whether recognition is suspended at `now`. Clears an expired pause.
    pub fn is_paused(&mut self, now: Instant) -> bool {
        match self.until {
            Some(until) if now < until => true,
            Some(_) => {
                self.until = None;
                self.validated = None;
                false
            }
            None => false,
        }
    }

    /// Time left in the current pause.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn validated(&self) -> Option<&str> {
        self.validated.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_paused_initially() {
        let mut gate = PauseGate::new(Duration::from_secs(10));
        let now = Instant::now();
        assert!(!gate.is_paused(now));
        assert_eq!(gate.remaining(now), Duration::ZERO);
        assert!(gate.validated().is_none());
    }

    #[test]
    fn test_pause_holds_until_deadline() {
        let mut gate = PauseGate::new(Duration::from_secs(10));
        let t0 = Instant::now();
        gate.pause("Ada", t0);

        assert!(gate.is_paused(t0));
        assert!(gate.is_paused(t0 + Duration::from_secs(9)));
        assert_eq!(gate.validated(), Some("Ada"));
        assert_eq!(gate.remaining(t0 + Duration::from_secs(4)), Duration::from_secs(6));

        assert!(!gate.is_paused(t0 + Duration::from_secs(10)));
        assert!(gate.validated().is_none());
    }

    #[test]
    fn test_new_pause_restarts_window() {
        let mut gate = PauseGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        gate.pause("Ada", t0);
        gate.pause("Bob", t0 + Duration::from_secs(4));
        assert!(gate.is_paused(t0 + Duration::from_secs(8)));
        assert_eq!(gate.validated(), Some("Bob"));
    }
}
