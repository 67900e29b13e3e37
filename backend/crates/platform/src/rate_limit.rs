//! Rate Limiting Infrastructure
//!
//! Fixed-window accounting shared by every storage backend, the decision
//! type reported to callers, and the storage trait.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RETRY_AFTER: &str = "X-RateLimit-Retry-After";
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";

/// Rate limit errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitStoreError {
    /// A single consume asked for more than the whole window allows
    #[error("Cannot consume {requested} tokens, the limit is {limit}")]
    ExceedsLimit { requested: u32, limit: u32 },

    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// Backend unreachable
    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum tokens consumable in one window
    pub limit: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    pub fn validate(&self) -> Result<(), RateLimitStoreError> {
        if self.limit == 0 {
            return Err(RateLimitStoreError::InvalidConfig(
                "limit must be a positive integer".to_string(),
            ));
        }
        if self.window_ms() <= 0 {
            return Err(RateLimitStoreError::InvalidConfig(
                "window must be at least one millisecond".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one consume
///
/// All three metadata fields are reported together, accepted or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub accepted: bool,
    pub remaining_tokens: u32,
    /// Unix timestamp (seconds) from which a retry can succeed
    pub retry_after: i64,
    pub limit: u32,
}

impl RateLimitDecision {
    /// `X-RateLimit-*` response headers for this decision
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_REMAINING, self.remaining_tokens.to_string()),
            (HEADER_RETRY_AFTER, self.retry_after.to_string()),
            (HEADER_LIMIT, self.limit.to_string()),
        ]
    }
}

/// Fixed-window counter for a single key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedWindow {
    window_start_ms: i64,
    consumed: u32,
}

impl FixedWindow {
    /// Consume `tokens` at `now_ms`; the window restarts once it has elapsed
    pub fn consume(
        &mut self,
        now_ms: i64,
        tokens: u32,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        if tokens > config.limit {
            return Err(RateLimitStoreError::ExceedsLimit {
                requested: tokens,
                limit: config.limit,
            });
        }

        let window_end_ms = self.window_start_ms + config.window_ms();
        if now_ms >= window_end_ms {
            self.window_start_ms = now_ms;
            self.consumed = 0;
        }

        let available = config.limit.saturating_sub(self.consumed);
        if tokens <= available {
            self.consumed += tokens;
            return Ok(RateLimitDecision {
                accepted: true,
                remaining_tokens: available - tokens,
                retry_after: now_ms.div_euclid(1000),
                limit: config.limit,
            });
        }

        let reset_ms = self.window_start_ms + config.window_ms();
        Ok(RateLimitDecision {
            accepted: false,
            remaining_tokens: available,
            retry_after: (reset_ms + 999).div_euclid(1000),
            limit: config.limit,
        })
    }

    /// Whether this window has elapsed and can be dropped
    pub fn is_expired(&self, now_ms: i64, config: &RateLimitConfig) -> bool {
        now_ms >= self.window_start_ms + config.window_ms()
    }
}

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Trait for rate limit storage backends
///
/// Implementations must apply the consume atomically per key.
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Consume `tokens` from the budget stored under `key`
    async fn consume(
        &self,
        key: &str,
        tokens: u32,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_budget_exhaustion() {
        let config = RateLimitConfig::new(3, 60);
        let mut window = FixedWindow::default();

        for expected_remaining in [2, 1, 0] {
            let decision = window.consume(T0, 1, &config).unwrap();
            assert!(decision.accepted);
            assert_eq!(decision.remaining_tokens, expected_remaining);
            assert_eq!(decision.limit, 3);
        }

        let rejected = window.consume(T0 + 10, 1, &config).unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.remaining_tokens, 0);
        assert_eq!(rejected.retry_after, (T0 + 60_000) / 1000);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let config = RateLimitConfig::new(1, 60);
        let mut window = FixedWindow::default();

        assert!(window.consume(T0, 1, &config).unwrap().accepted);
        assert!(!window.consume(T0 + 59_999, 1, &config).unwrap().accepted);
        assert!(window.is_expired(T0 + 60_000, &config));

        let decision = window.consume(T0 + 60_000, 1, &config).unwrap();
        assert!(decision.accepted);
        assert_eq!(decision.remaining_tokens, 0);
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let config = RateLimitConfig::new(5, 60);
        let mut window = FixedWindow::default();

        window.consume(T0, 4, &config).unwrap();
        let rejected = window.consume(T0, 2, &config).unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.remaining_tokens, 1);

        let accepted = window.consume(T0, 1, &config).unwrap();
        assert!(accepted.accepted);
        assert_eq!(accepted.remaining_tokens, 0);
    }

    #[test]
    fn test_exceeds_limit() {
        let config = RateLimitConfig::new(2, 60);
        let mut window = FixedWindow::default();
        assert_eq!(
            window.consume(T0, 3, &config),
            Err(RateLimitStoreError::ExceedsLimit {
                requested: 3,
                limit: 2
            })
        );
    }

    #[test]
    fn test_decision_headers() {
        let decision = RateLimitDecision {
            accepted: false,
            remaining_tokens: 0,
            retry_after: 1_700_000_060,
            limit: 10,
        };
        let headers = decision.headers();
        assert_eq!(headers[0], (HEADER_REMAINING, "0".to_string()));
        assert_eq!(headers[1], (HEADER_RETRY_AFTER, "1700000060".to_string()));
        assert_eq!(headers[2], (HEADER_LIMIT, "10".to_string()));
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());
        assert!(RateLimitConfig::new(0, 60).validate().is_err());
        assert!(RateLimitConfig::new(5, 0).validate().is_err());
    }
}
