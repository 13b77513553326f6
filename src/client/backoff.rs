use std::time::Duration;

/// Exponential backoff between reconnection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor applied per attempt (2.0 doubles the delay).
    pub multiplier: f64,
    /// Attempts before giving up on the socket and falling back to polling.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (zero based), or `None` once
    /// the attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.max(1.0).powf(f64::from(attempt));
        let secs = self.initial_delay.as_secs_f64() * factor;
        let delay = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            ..ReconnectPolicy::default()
        };

        assert_eq!(policy.delay_for(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_secs(16)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(9), Some(Duration::from_secs(30)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = ReconnectPolicy::default();

        assert!(policy.delay_for(4).is_some());
        assert_eq!(policy.delay_for(5), None);
    }

    #[test]
    fn zero_attempts_polls_immediately() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(0), None);
    }
}
