//! The ARTIM (association request) timer.

use std::time::{Duration, Instant};

/// The default time-to-live of the ARTIM timer.
pub const DEFAULT_ARTIM_TIMEOUT: Duration = Duration::from_secs(10);

/// A single countdown with a fixed time-to-live.
///
/// The state machine starts and stops it through its transition effects;
/// the provider loop polls [`take_expired`](ArtimTimer::take_expired)
/// to raise the expiry event exactly once per start.
#[derive(Debug)]
pub struct ArtimTimer {
    ttl: Duration,
    deadline: Option<Instant>,
}

impl ArtimTimer {
    pub fn new(ttl: Duration) -> Self {
        ArtimTimer {
            ttl,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown.
    pub fn start(&mut self) {
        self.deadline = Some(Instant::now() + self.ttl);
    }

    /// Stop the countdown without expiring.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Check for expiry, disarming the timer when it has fired.
    pub fn take_expired(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_start() {
        let mut timer = ArtimTimer::new(Duration::from_millis(1));
        assert!(!timer.take_expired());

        timer.start();
        assert!(timer.is_running());
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.take_expired());
        // disarmed after firing
        assert!(!timer.take_expired());
        assert!(!timer.is_running());
    }

    #[test]
    fn stop_prevents_expiry() {
        let mut timer = ArtimTimer::new(Duration::from_millis(1));
        timer.start();
        timer.stop();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!timer.take_expired());
    }
}
