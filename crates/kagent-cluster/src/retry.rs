//! Retry policy for transient cluster-API failures.

use std::time::Duration;

use kagent_common::ClusterError;

/// Default classifier: only `Transient` failures are worth retrying.
pub fn is_retryable(err: &ClusterError) -> bool {
    matches!(err, ClusterError::Transient { .. })
}

/// Bounded exponential backoff, injected into the adapter rather than
/// hard-coded at the call sites.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `2` means at most 3 attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub classify: fn(&ClusterError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            classify: is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Whether a failed attempt should be retried. `retries_done` counts
    /// retries already performed.
    pub fn should_retry(&self, err: &ClusterError, retries_done: u32) -> bool {
        retries_done < self.max_retries && (self.classify)(err)
    }

    /// Delay before the n-th retry (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.pow(retry.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ClusterError {
        ClusterError::Transient {
            detail: "connection reset".into(),
        }
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn retries_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&transient(), 0));
        assert!(policy.should_retry(&transient(), 1));
        assert!(!policy.should_retry(&transient(), 2));
    }

    #[test]
    fn non_transient_never_retried() {
        let policy = RetryPolicy::default();
        let denied = ClusterError::PermissionDenied {
            detail: "forbidden".into(),
        };
        let missing = ClusterError::NotFound {
            detail: "no such pod".into(),
        };
        assert!(!policy.should_retry(&denied, 0));
        assert!(!policy.should_retry(&missing, 0));
    }
}
