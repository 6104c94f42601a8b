use std::time::Duration;

/// Upper bound on any single backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Delay schedule between attempts.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// `base * 2^attempt`, clamped to `max`.
    Exponential {
        base: Duration,
        max: Duration,
    },
    /// The same delay before every retry.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Exponential backoff from `base`, capped at [`MAX_BACKOFF`].
    pub fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            max: MAX_BACKOFF,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// ```
    /// use std::time::Duration;
    /// use secure_invoke_client::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::exponential(Duration::from_millis(500));
    /// assert_eq!(strategy.delay_for(0), Duration::from_millis(500));
    /// assert_eq!(strategy.delay_for(2), Duration::from_secs(2));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { base, max } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.checked_mul(factor).map_or(*max, |d| d.min(*max))
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}
