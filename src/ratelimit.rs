//! Rate limiting for repeated diagnostics
//!
//! Warnings raised on every beacon would flood the log, so they are passed
//! through a fixed window limiter that allows a burst of messages per interval.

use std::time::{Duration, Instant};

/// Default window length
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of messages allowed per window
pub const DEFAULT_WARN_BURST: u32 = 10;

/// Fixed window message rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Window length
    interval: Duration,
    /// Messages allowed per window
    burst: u32,
    /// Start of the current window
    window_start: Option<Instant>,
    /// Messages emitted in the current window
    emitted: u32,
    /// Messages suppressed in the current window
    suppressed: u32,
}

impl RateLimiter {
    /// Create new limiter
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            window_start: None,
            emitted: 0,
            suppressed: 0,
        }
    }

    /// Check if a message may be emitted now
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Check if a message may be emitted at `now`
    pub fn allow_at(&mut self, now: Instant) -> bool {
        match self.window_start {
            Some(start) if now.duration_since(start) < self.interval => {}
            _ => {
                if self.suppressed > 0 {
                    log::warn!("{} messages suppressed", self.suppressed);
                }
                self.window_start = Some(now);
                self.emitted = 0;
                self.suppressed = 0;
            }
        }

        if self.emitted < self.burst {
            self.emitted += 1;
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Messages suppressed in the current window
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL, DEFAULT_WARN_BURST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_suppress() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5), 2);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
        assert_eq!(limiter.suppressed(), 1);
    }

    #[test]
    fn test_window_resets() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100), 1);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now + Duration::from_millis(50)));
        assert!(limiter.allow_at(now + Duration::from_millis(150)));
        assert_eq!(limiter.suppressed(), 0);
    }
}
