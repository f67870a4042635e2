//! Payment countdown
//!
//! Counts down whole ticks from a fixed budget. Expiry fires exactly once;
//! after that the countdown is stopped and further ticks are ignored.

use serde::Serialize;

/// Warning tier of the progress bar. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownTier {
    Normal,
    Warning,
    Critical,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not running, nothing changed
    Stopped,
    Remaining(u64),
    /// Reached zero on this tick; the countdown is now stopped
    Expired,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    total: u64,
    remaining: u64,
    running: bool,
}

impl Countdown {
    pub fn new(total_secs: u64) -> Self {
        Self { total: total_secs.max(1), remaining: total_secs.max(1), running: false }
    }

    /// Restart from the full budget
    pub fn start(&mut self) {
        self.remaining = self.total;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Stopped;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            Tick::Expired
        } else {
            Tick::Remaining(self.remaining)
        }
    }

    /// Remaining share of the budget in [0, 1], linear
    pub fn fraction(&self) -> f64 {
        self.remaining as f64 / self.total as f64
    }

    pub fn tier(&self) -> CountdownTier {
        let percent = self.fraction() * 100.0;
        if percent < 30.0 {
            CountdownTier::Critical
        } else if percent < 60.0 {
            CountdownTier::Warning
        } else {
            CountdownTier::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_countdown_ignores_ticks() {
        let mut countdown = Countdown::new(120);
        assert_eq!(countdown.tick(), Tick::Stopped);
        assert_eq!(countdown.remaining(), 120);
    }

    #[test]
    fn test_expires_once() {
        let mut countdown = Countdown::new(120);
        countdown.start();
        for expected in (1..120).rev() {
            assert_eq!(countdown.tick(), Tick::Remaining(expected));
        }
        assert_eq!(countdown.remaining(), 1);
        assert_eq!(countdown.tick(), Tick::Expired);
        assert!(!countdown.is_running());
        assert_eq!(countdown.tick(), Tick::Stopped);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn test_tiers() {
        let mut countdown = Countdown::new(100);
        countdown.start();
        assert_eq!(countdown.tier(), CountdownTier::Normal);
        for _ in 0..40 {
            countdown.tick();
        }
        // 60% remaining
        assert_eq!(countdown.tier(), CountdownTier::Normal);
        countdown.tick();
        assert_eq!(countdown.tier(), CountdownTier::Warning);
        for _ in 0..29 {
            countdown.tick();
        }
        // 30% remaining
        assert_eq!(countdown.tier(), CountdownTier::Warning);
        countdown.tick();
        assert_eq!(countdown.tier(), CountdownTier::Critical);
    }

    #[test]
    fn test_restart_resets_budget() {
        let mut countdown = Countdown::new(10);
        countdown.start();
        countdown.tick();
        countdown.tick();
        countdown.stop();
        assert_eq!(countdown.tick(), Tick::Stopped);
        countdown.start();
        assert_eq!(countdown.remaining(), 10);
        assert!((countdown.fraction() - 1.0).abs() < f64::EPSILON);
    }
}
