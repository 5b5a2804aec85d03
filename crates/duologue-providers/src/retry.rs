use std::time::Duration;

/// Exponential backoff for transient provider failures.
///
/// Defaults per the runtime contract: base 1 s, factor 2, capped at 60 s,
/// at most 5 attempts. Attempt numbering starts at 1; `delay_for` returns
/// the sleep to take *after* that attempt failed, or `None` when the
/// budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-based), `None` when no
    /// further attempt is allowed.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let raw = self.base.as_secs_f64() * exp;
        Some(Duration::from_secs_f64(raw.min(self.cap.as_secs_f64())))
    }

    /// The larger of the computed backoff and a vendor wait hint, still
    /// subject to the cap
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Option<Duration> {
        let computed = self.delay_for(attempt)?;
        let chosen = match hint {
            Some(hint) if hint > computed => hint,
            _ => computed,
        };
        Some(chosen.min(self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_budget_exhausted_after_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(5).is_none());
        assert!(policy.delay_for(6).is_none());
    }

    #[test]
    fn test_cap_applies() {
        let policy = RetryPolicy {
            max_attempts: 20,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(10), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_retry_after_hint_wins_when_larger() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_with_hint(1, Some(Duration::from_secs(30)));
        assert_eq!(delay, Some(Duration::from_secs(30)));

        // Smaller hints do not shrink the computed backoff
        let delay = policy.delay_with_hint(3, Some(Duration::from_secs(1)));
        assert_eq!(delay, Some(Duration::from_secs(4)));

        // Hints never exceed the cap
        let delay = policy.delay_with_hint(1, Some(Duration::from_secs(300)));
        assert_eq!(delay, Some(Duration::from_secs(60)));
    }
}
