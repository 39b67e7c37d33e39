use core::time::Duration;

/// Shortest wait before the link retries a failed join or initialization
pub const MIN_BACKOFF: Duration = Duration::from_secs(10);

/// How the link learns about join completion and retries a failed join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinRetry {
    /// The service reports join completion through
    /// [`ServiceEvent`](crate::service::ServiceEvent)s; a failed join is
    /// retried as soon as it is reported.
    #[default]
    Immediate,
    /// The service has no join notification. `tick` polls for completion
    /// and waits the given delay after a failure before joining again.
    Backoff(Duration),
}

impl JoinRetry {
    /// Polling policy with `delay` raised to at least [`MIN_BACKOFF`]
    pub fn backoff(delay: Duration) -> Self {
        JoinRetry::Backoff(delay.max(MIN_BACKOFF))
    }

    /// Whether `tick` must poll the service for join completion
    pub fn polls_join(&self) -> bool {
        matches!(self, JoinRetry::Backoff(_))
    }

    /// Wait after a failure before the next attempt
    pub fn retry_delay(&self) -> Duration {
        match self {
            JoinRetry::Immediate => MIN_BACKOFF,
            JoinRetry::Backoff(delay) => (*delay).max(MIN_BACKOFF),
        }
    }
}
