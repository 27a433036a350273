use std::time::{Duration, Instant};

/// Drops user-facing error notices that arrive within `window` of the last one shown.
#[derive(Debug, Clone)]
pub struct ErrorThrottle {
    window: Duration,
    last_shown: Option<Instant>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: None,
        }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last_shown {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_shown = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_window() {
        let mut throttle = ErrorThrottle::new(Duration::from_millis(2500));
        let t0 = Instant::now();
        assert!(throttle.allow(t0));
        assert!(!throttle.allow(t0 + Duration::from_millis(100)));
        assert!(!throttle.allow(t0 + Duration::from_millis(2499)));
        assert!(throttle.allow(t0 + Duration::from_millis(2500)));
        assert!(!throttle.allow(t0 + Duration::from_millis(3000)));
    }

    #[test]
    fn zero_window_never_suppresses() {
        let mut throttle = ErrorThrottle::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(throttle.allow(t0));
        assert!(throttle.allow(t0));
    }
}
