//! Reconnect-backoff configuration shared by [`crate::reconnect::ReconnectState`].

use std::time::Duration;

/// Backoff parameters for a connect-retry loop.
///
/// # Examples
///
/// ```
/// use mrpc_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Initial reconnection delay after a failed connect attempt.
    pub reconnect_ivl: Duration,

    /// Ceiling for the exponential backoff. `Duration::ZERO` disables backoff
    /// growth — every attempt waits `reconnect_ivl`.
    pub reconnect_ivl_max: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO,
        }
    }
}

impl SocketOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    /// The interval to use for a given attempt number, doubling from
    /// `reconnect_ivl` up to `reconnect_ivl_max` (or never growing, if
    /// `reconnect_ivl_max` is zero).
    #[must_use]
    pub fn next_reconnect_ivl(&self, attempt: u32) -> Duration {
        if self.reconnect_ivl_max.is_zero() {
            return self.reconnect_ivl;
        }
        let backoff = self.reconnect_ivl.saturating_mul(2u32.saturating_pow(attempt));
        backoff.min(self.reconnect_ivl_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = SocketOptions::default();
        assert_eq!(opts.reconnect_ivl, Duration::from_millis(100));
        assert_eq!(opts.reconnect_ivl_max, Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let opts = SocketOptions::new()
            .with_reconnect_ivl(Duration::from_millis(100))
            .with_reconnect_ivl_max(Duration::from_secs(10));

        assert_eq!(opts.next_reconnect_ivl(0), Duration::from_millis(100));
        assert_eq!(opts.next_reconnect_ivl(1), Duration::from_millis(200));
        assert_eq!(opts.next_reconnect_ivl(2), Duration::from_millis(400));
        assert_eq!(opts.next_reconnect_ivl(10), Duration::from_secs(10));
    }

    #[test]
    fn no_max_means_constant_interval() {
        let opts = SocketOptions::new().with_reconnect_ivl(Duration::from_millis(100));
        assert_eq!(opts.next_reconnect_ivl(0), Duration::from_millis(100));
        assert_eq!(opts.next_reconnect_ivl(10), Duration::from_millis(100));
    }
}
