//! In-Memory Repository Implementations
//!
//! Process-local backends for tests and single-instance deployments.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use platform::password::HashedPassword;
use platform::rate_limit::{
    FixedWindow, RateLimitConfig, RateLimitDecision, RateLimitStore, RateLimitStoreError, now_ms,
};

use crate::domain::repository::{CredentialRepository, SessionRepository};
use crate::domain::session::{SessionData, SessionId};
use crate::error::SecurityResult;

/// Stored session with the time it was last loaded or saved
#[derive(Debug, Clone)]
struct SessionEntry {
    data: SessionData,
    touched_ms: i64,
}

/// In-memory session repository
#[derive(Debug, Clone, Default)]
pub struct MemorySessionRepository {
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions untouched for longer than `max_idle`
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        self.purge_idle_at(now_ms(), max_idle)
    }

    /// Purge at an explicit time (Unix milliseconds)
    pub fn purge_idle_at(&self, now_ms: i64, max_idle: Duration) -> usize {
        let max_idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(max_idle_ms);
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.touched_ms >= cutoff);
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged idle sessions");
        }
        purged
    }
}

impl SessionRepository for MemorySessionRepository {
    async fn load(&self, id: &SessionId) -> SecurityResult<Option<SessionData>> {
        Ok(self.sessions.get_mut(id.as_str()).map(|mut entry| {
            entry.touched_ms = now_ms();
            entry.data.clone()
        }))
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> SecurityResult<()> {
        self.sessions.insert(
            id.as_str().to_string(),
            SessionEntry {
                data: data.clone(),
                touched_ms: now_ms(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> SecurityResult<()> {
        self.sessions.remove(id.as_str());
        Ok(())
    }
}

/// In-memory fixed-window rate limit store
#[derive(Debug, Clone, Default)]
pub struct MemoryRateLimitStore {
    windows: Arc<DashMap<String, FixedWindow>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume at an explicit time (Unix milliseconds)
    pub fn consume_at(
        &self,
        key: &str,
        tokens: u32,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        // The entry guard holds the shard lock for the whole read-modify-write
        let mut window = self.windows.entry(key.to_string()).or_default();
        window.consume(now_ms, tokens, config)
    }

    /// Drop windows that have elapsed
    pub fn purge_expired(&self, config: &RateLimitConfig) -> usize {
        let now = now_ms();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now, config));
        let purged = before.saturating_sub(self.windows.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired rate limit windows");
        }
        purged
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn consume(
        &self,
        key: &str,
        tokens: u32,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        self.consume_at(key, tokens, config, now_ms())
    }
}

/// In-memory credential store (user name -> password hash)
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialRepository {
    hashes: Arc<DashMap<String, String>>,
}

impl MemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_name: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(user_name.into(), hash.into());
    }
}

impl CredentialRepository for MemoryCredentialRepository {
    async fn find_hash(&self, user_name: &str) -> SecurityResult<Option<String>> {
        Ok(self.hashes.get(user_name).map(|entry| entry.value().clone()))
    }

    async fn update_hash(&self, user_name: &str, hash: &HashedPassword) -> SecurityResult<()> {
        self.hashes
            .insert(user_name.to_string(), hash.as_str().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_session_repository_round_trip() {
        let repo = MemorySessionRepository::new();
        let id = SessionId::generate();
        let mut data = SessionData::new();
        data.insert("k".to_string(), json!("v"));

        assert!(repo.load(&id).await.unwrap().is_none());
        repo.save(&id, &data).await.unwrap();
        assert_eq!(repo.load(&id).await.unwrap(), Some(data));
        assert_eq!(repo.len(), 1);

        repo.destroy(&id).await.unwrap();
        assert!(repo.is_empty());
        // Unknown ids are not an error
        repo.destroy(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_idle_sessions() {
        let repo = MemorySessionRepository::new();
        let idle = SessionId::generate();
        let active = SessionId::generate();
        repo.save(&idle, &SessionData::new()).await.unwrap();
        repo.save(&active, &SessionData::new()).await.unwrap();

        let max_idle = Duration::from_secs(60);
        let later = now_ms() + 120_000;
        // Nothing is idle yet
        assert_eq!(repo.purge_idle(max_idle), 0);

        repo.sessions.alter(idle.as_str(), |_, mut entry| {
            entry.touched_ms -= 120_000;
            entry
        });
        repo.sessions.alter(active.as_str(), |_, mut entry| {
            entry.touched_ms = later;
            entry
        });
        assert_eq!(repo.purge_idle_at(later - 30_000, max_idle), 1);
        assert!(repo.load(&idle).await.unwrap().is_none());
        assert!(repo.load(&active).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_load_refreshes_idle_clock() {
        let repo = MemorySessionRepository::new();
        let id = SessionId::generate();
        repo.save(&id, &SessionData::new()).await.unwrap();
        repo.sessions.alter(id.as_str(), |_, mut entry| {
            entry.touched_ms -= 120_000;
            entry
        });

        repo.load(&id).await.unwrap();
        assert_eq!(repo.purge_idle(Duration::from_secs(60)), 0);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_rate_limit_store_keys_are_isolated() {
        let store = MemoryRateLimitStore::new();
        let config = RateLimitConfig::new(1, 60);
        let t0 = 1_700_000_000_000;

        assert!(store.consume_at("a", 1, &config, t0).unwrap().accepted);
        assert!(!store.consume_at("a", 1, &config, t0).unwrap().accepted);
        assert!(store.consume_at("b", 1, &config, t0).unwrap().accepted);
        assert!(store.consume_at("a", 1, &config, t0 + 60_000).unwrap().accepted);
    }

    #[tokio::test]
    async fn test_rate_limit_store_concurrent_consumers() {
        let store = MemoryRateLimitStore::new();
        let config = RateLimitConfig::new(50, 60);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = store.clone();
                let config = config.clone();
                tokio::spawn(async move { store.consume("shared", 1, &config).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 50);
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryRateLimitStore::new();
        let config = RateLimitConfig::new(5, 60);
        store.consume_at("old", 1, &config, 1_000).unwrap();
        store.consume_at("fresh", 1, &config, now_ms()).unwrap();

        assert_eq!(store.purge_expired(&config), 1);
    }

    #[tokio::test]
    async fn test_credentials() {
        let repo = MemoryCredentialRepository::new();
        repo.insert("alice", "$argon2id$placeholder");
        assert_eq!(
            repo.find_hash("alice").await.unwrap().as_deref(),
            Some("$argon2id$placeholder")
        );
        assert!(repo.find_hash("bob").await.unwrap().is_none());
    }
}
