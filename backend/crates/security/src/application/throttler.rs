//! Request Throttler
//!
//! Per-client consumption budget on top of a [`RateLimitStore`].

use std::sync::Arc;

use platform::client::RequestContext;
use platform::rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitStore};

use crate::error::{SecurityError, SecurityResult};

/// Rate limiter bound to one client identity
pub struct Throttler<L>
where
    L: RateLimitStore,
{
    store: Arc<L>,
    config: RateLimitConfig,
    identity: String,
    namespace: String,
}

impl<L> Throttler<L>
where
    L: RateLimitStore,
{
    pub fn new(
        store: Arc<L>,
        config: RateLimitConfig,
        identity: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            identity: identity.into(),
            namespace: namespace.into(),
        }
    }

    /// Throttler keyed by the client's remote address
    pub fn for_client(
        store: Arc<L>,
        config: RateLimitConfig,
        ctx: &RequestContext,
        namespace: impl Into<String>,
    ) -> Self {
        Self::new(store, config, ctx.identity(), namespace)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn key(&self, namespace: &str) -> String {
        format!("{}:{}", namespace, self.identity)
    }

    /// Consume `tokens` from the default namespace
    ///
    /// A rejection is reported in the decision, not as an error.
    pub async fn consume(&self, tokens: u32) -> SecurityResult<RateLimitDecision> {
        let key = self.key(&self.namespace);
        let decision = self.store.consume(&key, tokens, &self.config).await?;
        tracing::debug!(
            identity = %self.identity,
            accepted = decision.accepted,
            remaining = decision.remaining_tokens,
            "Rate limit consumed"
        );
        Ok(decision)
    }

    /// Consume one token from `namespace`, failing once the budget is exhausted
    pub async fn throttle(&self, namespace: &str) -> SecurityResult<RateLimitDecision> {
        let key = self.key(namespace);
        let decision = self.store.consume(&key, 1, &self.config).await?;
        if !decision.accepted {
            tracing::warn!(
                identity = %self.identity,
                namespace,
                retry_after = decision.retry_after,
                "Too many attempts"
            );
            return Err(SecurityError::RateLimitExceeded { decision });
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryRateLimitStore;

    fn throttler(
        store: &Arc<MemoryRateLimitStore>,
        ip: &str,
        limit: u32,
    ) -> Throttler<MemoryRateLimitStore> {
        Throttler::new(store.clone(), RateLimitConfig::new(limit, 60), ip, "request")
    }

    #[tokio::test]
    async fn test_exhaustion_reports_zero_remaining() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let limiter = throttler(&store, "198.51.100.1", 2);

        assert!(limiter.consume(1).await.unwrap().accepted);
        assert!(limiter.consume(1).await.unwrap().accepted);

        let rejected = limiter.consume(1).await.unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.remaining_tokens, 0);
        assert_eq!(rejected.limit, 2);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let first = throttler(&store, "198.51.100.1", 1);
        let second = throttler(&store, "198.51.100.2", 1);

        assert!(first.consume(1).await.unwrap().accepted);
        assert!(!first.consume(1).await.unwrap().accepted);

        let decision = second.consume(1).await.unwrap();
        assert!(decision.accepted);
        assert_eq!(decision.remaining_tokens, 0);
    }

    #[tokio::test]
    async fn test_throttle_errors_with_decision() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let limiter = throttler(&store, "198.51.100.1", 1);

        assert!(limiter.throttle("login").await.is_ok());
        match limiter.throttle("login").await {
            Err(SecurityError::RateLimitExceeded { decision }) => {
                assert!(!decision.accepted);
                assert_eq!(decision.remaining_tokens, 0);
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }

        // Other namespaces keep their own budget
        assert!(limiter.throttle("signup").await.is_ok());
        assert!(limiter.consume(1).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_consume_more_than_limit() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let limiter = throttler(&store, "198.51.100.1", 3);
        assert!(matches!(
            limiter.consume(4).await,
            Err(SecurityError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_for_client_uses_remote_address() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let ctx = RequestContext::default().with_remote_addr("203.0.113.9".parse().unwrap());
        let limiter = Throttler::for_client(store, RateLimitConfig::default(), &ctx, "request");
        assert_eq!(limiter.identity(), "203.0.113.9");
    }
}
