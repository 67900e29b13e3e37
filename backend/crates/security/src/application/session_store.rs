//! Session Store
//!
//! Owns the session of one request: lifecycle, fingerprint binding and the
//! keyed data bag. Cookie changes are queued and written out with
//! [`SessionStore::drain_cookies`], built from the configuration current at
//! that moment.

use std::sync::Arc;

use platform::client::{ClientFingerprint, RequestContext};
use serde_json::Value;

use crate::application::config::{SameSite, SessionConfig};
use crate::domain::repository::SessionRepository;
use crate::domain::session::{SessionData, SessionId, SessionState};
use crate::error::{SecurityError, SecurityResult};

/// Session key holding the client fingerprint
pub const FINGERPRINT_KEY: &str = "fingerprint";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingCookie {
    Issue(SessionId),
    Expire,
}

/// Per-request session handle
pub struct SessionStore<R>
where
    R: SessionRepository,
{
    repo: Arc<R>,
    config: SessionConfig,
    ctx: RequestContext,
    id: Option<SessionId>,
    data: SessionData,
    state: SessionState,
    cookies: Vec<PendingCookie>,
}

impl<R> SessionStore<R>
where
    R: SessionRepository,
{
    /// Create a store without starting the session
    pub fn new(repo: Arc<R>, config: SessionConfig, ctx: RequestContext) -> Self {
        Self {
            repo,
            config,
            ctx,
            id: None,
            data: SessionData::new(),
            state: SessionState::NotStarted,
            cookies: Vec::new(),
        }
    }

    /// Create a store and start the session unless one already exists
    pub async fn open(
        repo: Arc<R>,
        config: SessionConfig,
        ctx: RequestContext,
    ) -> SecurityResult<Self> {
        config.validate()?;
        let mut store = Self::new(repo, config, ctx);
        if !store.exists() {
            store.start().await?;
        }
        Ok(store)
    }

    /// Begin or resume the session
    ///
    /// A stored fingerprint must match the current client, otherwise the
    /// session is destroyed and [`SecurityError::Integrity`] is returned.
    /// Returns whether a session is now active.
    pub async fn start(&mut self) -> SecurityResult<bool> {
        if !self.ctx.is_http() {
            return Ok(false);
        }

        if self.state != SessionState::Active {
            self.resume_or_create().await?;
        }

        if self.config.fingerprinting {
            let fingerprint = ClientFingerprint::compute(
                &self.ctx,
                self.config.validate_ip,
                self.config.validate_ua,
            );
            let stored_matches = self
                .data
                .get(FINGERPRINT_KEY)
                .map(|stored| stored.as_str().is_some_and(|s| fingerprint.matches(s)));
            match stored_matches {
                Some(true) => {}
                Some(false) => {
                    let session = self.id.as_ref().map(|id| id.short().to_string());
                    self.stop().await?;
                    tracing::warn!(
                        session = ?session,
                        client = %self.ctx.identity(),
                        "Session fingerprint mismatch, session destroyed"
                    );
                    return Err(SecurityError::Integrity);
                }
                None => {
                    self.data.insert(
                        FINGERPRINT_KEY.to_string(),
                        Value::String(fingerprint.as_str().to_string()),
                    );
                }
            }
        }

        self.state = SessionState::Active;
        Ok(true)
    }

    async fn resume_or_create(&mut self) -> SecurityResult<()> {
        if let Some(id) = self.requested_id() {
            if let Some(data) = self.repo.load(&id).await? {
                tracing::debug!(session = %id.short(), "Session resumed");
                self.data = data;
                self.id = Some(id);
                return Ok(());
            }
            tracing::debug!(session = %id.short(), "Unknown session id, issuing a new one");
        }

        let id = SessionId::generate();
        tracing::info!(session = %id.short(), "Session created");
        self.data = SessionData::new();
        self.cookies.push(PendingCookie::Issue(id.clone()));
        self.id = Some(id);
        Ok(())
    }

    /// Session id sent by the client, from the cookie or (when allowed) the query
    fn requested_id(&self) -> Option<SessionId> {
        let name = self.config.name();
        let raw = self.ctx.cookie(name).or_else(|| {
            if self.config.use_only_cookies {
                None
            } else {
                self.ctx.query_param(name)
            }
        })?;
        SessionId::parse(&raw)
    }

    /// Clear all state, expire the cookie and destroy server-side storage
    ///
    /// Returns whether there was a session to destroy.
    pub async fn stop(&mut self) -> SecurityResult<bool> {
        self.data.clear();
        let Some(id) = self.id.take() else {
            return Ok(false);
        };

        self.repo.destroy(&id).await?;
        self.cookies.retain(|c| *c == PendingCookie::Expire);
        self.cookies.push(PendingCookie::Expire);
        self.state = SessionState::Destroyed;
        tracing::info!(session = %id.short(), "Session destroyed");
        Ok(true)
    }

    /// True iff the session is active in a request-serving context
    pub fn exists(&self) -> bool {
        self.ctx.is_http() && self.state == SessionState::Active
    }

    /// Move the session to a new identifier
    ///
    /// With `delete_old` the old identifier is destroyed, otherwise it keeps
    /// a copy of the current data.
    pub async fn regenerate(&mut self, delete_old: bool) -> SecurityResult<bool> {
        if !self.exists() {
            return Err(SecurityError::SessionNotActive);
        }
        let new_id = SessionId::generate();
        if let Some(old_id) = self.id.replace(new_id.clone()) {
            if delete_old {
                self.repo.destroy(&old_id).await?;
            } else {
                self.repo.save(&old_id, &self.data).await?;
            }
            tracing::info!(
                old = %old_id.short(),
                new = %new_id.short(),
                delete_old,
                "Session regenerated"
            );
        }
        self.cookies.retain(|c| !matches!(c, PendingCookie::Issue(_)));
        self.cookies.push(PendingCookie::Issue(new_id));
        Ok(true)
    }

    /// Persist the data bag of an active session
    pub async fn commit(&self) -> SecurityResult<()> {
        if let (SessionState::Active, Some(id)) = (self.state, &self.id) {
            self.repo.save(id, &self.data).await?;
        }
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Stored value, or `default` when absent
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    /// Borrow a stored value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Read-once access: returns the value (or `default`) and deletes the key
    pub fn flash(&mut self, key: &str, default: Value) -> Value {
        self.data.remove(key).unwrap_or(default)
    }

    /// Apply hardened cookie settings
    ///
    /// Queued cookies are built afterwards, so this also covers a session
    /// started earlier in the same request.
    pub fn harden(&mut self, same_site: SameSite, secure: bool) {
        self.config.cookie.secure = secure;
        self.config.cookie.http_only = true;
        self.config.cookie.same_site = same_site;
        self.config.use_only_cookies = true;
    }

    /// Take the queued `Set-Cookie` values
    pub fn drain_cookies(&mut self) -> Vec<String> {
        let cookie = &self.config.cookie;
        self.cookies
            .drain(..)
            .map(|pending| match pending {
                PendingCookie::Issue(id) => cookie.build_set_cookie(id.as_str()),
                PendingCookie::Expire => cookie.build_delete_cookie(),
            })
            .collect()
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemorySessionRepository;
    use serde_json::json;

    fn client(ip: &str, ua: &str) -> RequestContext {
        RequestContext::default()
            .with_remote_addr(ip.parse().unwrap())
            .with_user_agent(ua)
            .with_target("/account")
    }

    fn config() -> SessionConfig {
        SessionConfig::development()
    }

    async fn open(
        repo: &Arc<MemorySessionRepository>,
        ctx: RequestContext,
    ) -> SecurityResult<SessionStore<MemorySessionRepository>> {
        SessionStore::open(repo.clone(), config(), ctx).await
    }

    /// Commit the session and return a follow-up request carrying its cookie
    async fn next_request(
        store: &SessionStore<MemorySessionRepository>,
        ctx: RequestContext,
    ) -> RequestContext {
        store.commit().await.unwrap();
        let id = store.id().unwrap().as_str().to_string();
        ctx.with_cookie(store.config().name(), &id)
    }

    #[tokio::test]
    async fn test_open_starts_session() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();

        assert!(store.exists());
        assert_eq!(store.state(), SessionState::Active);
        assert!(store.has(FINGERPRINT_KEY));

        let cookies = store.drain_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with(&format!("session={}", store.id().unwrap())));
        assert!(store.drain_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_same_client() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        assert!(store.start().await.unwrap());

        let ctx = next_request(&store, client("10.0.0.1", "UA")).await;
        let resumed = open(&repo, ctx).await.unwrap();
        assert_eq!(resumed.id(), store.id());
        assert!(resumed.exists());
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_destroys_session() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        store.put("user", "alice");
        let id = store.id().unwrap().clone();

        for ctx in [client("10.0.0.2", "UA"), client("10.0.0.1", "Other UA")] {
            let ctx = next_request(&store, ctx).await;
            let mut hijacked = SessionStore::new(repo.clone(), config(), ctx);
            assert!(matches!(hijacked.start().await, Err(SecurityError::Integrity)));
            assert_eq!(hijacked.state(), SessionState::Destroyed);
            assert!(!hijacked.exists());
            assert!(repo.load(&id).await.unwrap().is_none());
            assert!(hijacked.drain_cookies().iter().any(|c| c.contains("Max-Age=0")));
        }
    }

    #[tokio::test]
    async fn test_fingerprint_ignores_excluded_attributes() {
        let repo = Arc::new(MemorySessionRepository::new());
        let relaxed = SessionConfig {
            validate_ip: false,
            ..config()
        };
        let store = SessionStore::open(repo.clone(), relaxed.clone(), client("10.0.0.1", "UA"))
            .await
            .unwrap();

        let ctx = next_request(&store, client("10.9.9.9", "UA")).await;
        let resumed = SessionStore::open(repo.clone(), relaxed, ctx).await.unwrap();
        assert_eq!(resumed.id(), store.id());
    }

    #[tokio::test]
    async fn test_fingerprinting_disabled() {
        let repo = Arc::new(MemorySessionRepository::new());
        let off = SessionConfig {
            fingerprinting: false,
            ..config()
        };
        let store = SessionStore::open(repo.clone(), off.clone(), client("10.0.0.1", "UA"))
            .await
            .unwrap();
        assert!(!store.has(FINGERPRINT_KEY));

        let ctx = next_request(&store, client("10.0.0.2", "Other")).await;
        assert!(SessionStore::open(repo.clone(), off, ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_id_is_replaced() {
        let repo = Arc::new(MemorySessionRepository::new());
        let forged = SessionId::generate();
        let ctx = client("10.0.0.1", "UA").with_cookie("session", forged.as_str());

        let store = open(&repo, ctx).await.unwrap();
        assert_ne!(store.id(), Some(&forged));
    }

    #[tokio::test]
    async fn test_query_string_id_requires_opt_in() {
        let repo = Arc::new(MemorySessionRepository::new());
        let store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        store.commit().await.unwrap();
        let id = store.id().unwrap().as_str().to_string();
        let ctx = client("10.0.0.1", "UA").with_target(&format!("/account?session={id}"));

        let cookie_only = open(&repo, ctx.clone()).await.unwrap();
        assert_ne!(cookie_only.id().unwrap().as_str(), id);

        let permissive = SessionConfig {
            use_only_cookies: false,
            ..config()
        };
        let resumed = SessionStore::open(repo.clone(), permissive, ctx).await.unwrap();
        assert_eq!(resumed.id().unwrap().as_str(), id);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        store.commit().await.unwrap();
        store.put("k", 1);
        let id = store.id().unwrap().clone();
        store.drain_cookies();

        assert!(store.stop().await.unwrap());
        assert!(!store.exists());
        assert!(!store.has("k"));
        assert!(repo.load(&id).await.unwrap().is_none());
        let cookies = store.drain_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("session=;"));

        assert!(!store.stop().await.unwrap());
        assert!(store.drain_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        store.put("cart", json!([1, 2]));
        store.commit().await.unwrap();
        let old = store.id().unwrap().clone();

        assert!(store.regenerate(false).await.unwrap());
        let kept = store.id().unwrap().clone();
        assert_ne!(kept, old);
        assert_eq!(repo.load(&old).await.unwrap().unwrap()["cart"], json!([1, 2]));
        assert_eq!(store.get("cart", Value::Null), json!([1, 2]));

        assert!(store.regenerate(true).await.unwrap());
        assert!(repo.load(&kept).await.unwrap().is_none());

        let cookies = store.drain_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].contains(store.id().unwrap().as_str()));
    }

    #[tokio::test]
    async fn test_regenerate_requires_session() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = SessionStore::new(repo, config(), client("10.0.0.1", "UA"));
        assert!(matches!(
            store.regenerate(true).await,
            Err(SecurityError::SessionNotActive)
        ));
    }

    #[tokio::test]
    async fn test_keyed_access_and_flash() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();

        assert!(!store.has("notice"));
        assert_eq!(store.get("notice", json!("none")), json!("none"));

        store.put("notice", "Saved");
        assert!(store.has("notice"));
        assert_eq!(store.get("notice", Value::Null), json!("Saved"));

        assert_eq!(store.flash("notice", Value::Null), json!("Saved"));
        assert!(!store.has("notice"));
        assert_eq!(store.flash("notice", json!("gone")), json!("gone"));

        store.put("tmp", true);
        assert_eq!(store.delete("tmp"), Some(json!(true)));
        assert!(!store.has("tmp"));
    }

    #[tokio::test]
    async fn test_cli_context_never_exists() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, RequestContext::cli("bin/worker")).await.unwrap();
        assert!(!store.start().await.unwrap());
        assert!(!store.exists());
        assert!(store.drain_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_harden_applies_to_queued_cookie() {
        let repo = Arc::new(MemorySessionRepository::new());
        let mut store = open(&repo, client("10.0.0.1", "UA")).await.unwrap();
        store.harden(SameSite::Strict, true);

        let cookie = &store.drain_cookies()[0];
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(store.config().use_only_cookies);
    }
}
