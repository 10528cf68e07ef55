/// Bounded retry counter shared by the timeout handlers of both layers
///
/// The owner resets it at the start of every transaction (and every start-up
/// attempt), so failures never accumulate across unrelated transactions.
///
/// `max_retries = N` allows N re-attempts after the first try:
/// - timeouts 1..=N → [`RetryDecision::Retry`]
/// - timeout N+1 → [`RetryDecision::Exhausted`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u8,
    attempts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-attempt; `attempt` is 1-based
    Retry { attempt: u8 },
    /// Give up after `attempts` retries
    Exhausted { attempts: u8 },
}

impl RetryPolicy {
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            attempts: 0,
        }
    }

    /// Record a timeout and decide what to do about it
    pub fn on_timeout(&mut self) -> RetryDecision {
        if self.attempts >= self.max_retries {
            return RetryDecision::Exhausted {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        RetryDecision::Retry {
            attempt: self.attempts,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_until_exhausted() {
        let mut policy = RetryPolicy::new(3);
        assert_eq!(policy.on_timeout(), RetryDecision::Retry { attempt: 1 });
        assert_eq!(policy.on_timeout(), RetryDecision::Retry { attempt: 2 });
        assert_eq!(policy.on_timeout(), RetryDecision::Retry { attempt: 3 });
        assert_eq!(policy.on_timeout(), RetryDecision::Exhausted { attempts: 3 });

        // Stays exhausted, counter does not run past the bound
        assert_eq!(policy.on_timeout(), RetryDecision::Exhausted { attempts: 3 });
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn test_reset_gives_next_transaction_full_budget() {
        let mut policy = RetryPolicy::new(1);
        assert_eq!(policy.on_timeout(), RetryDecision::Retry { attempt: 1 });
        assert_eq!(policy.on_timeout(), RetryDecision::Exhausted { attempts: 1 });

        policy.reset();
        assert_eq!(policy.on_timeout(), RetryDecision::Retry { attempt: 1 });
    }

    #[test]
    fn test_zero_retries_fails_first_timeout() {
        let mut policy = RetryPolicy::new(0);
        assert_eq!(policy.on_timeout(), RetryDecision::Exhausted { attempts: 0 });
        assert_eq!(policy.max_retries(), 0);
    }
}
