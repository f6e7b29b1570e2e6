use std::time::Duration;

use super::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Retry behaviour for one queue item, decided purely from the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Rate-limit backoff is `2^(attempt + 1)` of this unit: 2, 4, 8, ...
    pub backoff_unit: Duration,
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            transient_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is zero-based: the attempt that just failed.
    pub fn decide(&self, error: &ExtractionError, attempt: u32) -> RetryDecision {
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        match error {
            ExtractionError::MalformedOutput { .. } => RetryDecision::GiveUp,
            ExtractionError::RateLimited { retry_after } => {
                let backoff = self.backoff_unit * 2_u32.saturating_pow(attempt + 1);
                RetryDecision::RetryAfter(retry_after.map_or(backoff, |hint| hint.max(backoff)))
            }
            ExtractionError::Transient(_) => RetryDecision::RetryAfter(self.transient_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> ExtractionError {
        ExtractionError::RateLimited { retry_after: None }
    }

    #[test]
    fn rate_limit_backs_off_exponentially_until_attempts_run_out() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&rate_limited(), 0),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(&rate_limited(), 1),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(policy.decide(&rate_limited(), 2), RetryDecision::GiveUp);
    }

    #[test]
    fn rate_limit_honours_longer_server_hint() {
        let policy = RetryPolicy::default();
        let error = ExtractionError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(
            policy.decide(&error, 0),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
    }

    #[test]
    fn malformed_output_is_never_retried() {
        let policy = RetryPolicy::default();
        let error = ExtractionError::MalformedOutput {
            reason: "expected value".to_string(),
        };
        assert_eq!(policy.decide(&error, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn transient_errors_retry_with_fixed_delay() {
        let policy = RetryPolicy::default();
        let error = ExtractionError::Transient("connection reset".to_string());
        assert_eq!(
            policy.decide(&error, 0),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(&error, 1),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(policy.decide(&error, 2), RetryDecision::GiveUp);
    }
}
