//! Security Orchestrator
//!
//! Pre-request gate (CSRF + rate limit) and post-response hardening for one
//! request.

use http::HeaderMap;
use platform::headers::ResponseHeaders;
use platform::rate_limit::{RateLimitDecision, RateLimitStore};

use crate::application::config::SameSite;
use crate::application::csrf::CsrfGuard;
use crate::application::session_store::SessionStore;
use crate::application::throttler::Throttler;
use crate::domain::form::FormFields;
use crate::domain::repository::SessionRepository;
use crate::domain::session::is_truthy;
use crate::error::{SecurityError, SecurityResult};

/// Hardening headers applied to sensitive responses
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("X-Frame-Options", "sameorigin"),
    ("X-Content-Type-Options", "nosniff"),
    ("Cache-Control", "no-store, no-cache, must-revalidate"),
    ("Expires", "Thu, 19 Nov 1981 00:00:00 GMT"),
    ("Pragma", "no-cache"),
];

pub struct SecurityOrchestrator<R, L>
where
    R: SessionRepository,
    L: RateLimitStore,
{
    session: SessionStore<R>,
    csrf: CsrfGuard,
    throttler: Throttler<L>,
    headers: ResponseHeaders,
    logged_in_key: String,
}

impl<R, L> SecurityOrchestrator<R, L>
where
    R: SessionRepository,
    L: RateLimitStore,
{
    pub fn new(
        session: SessionStore<R>,
        csrf: CsrfGuard,
        throttler: Throttler<L>,
        logged_in_key: impl Into<String>,
    ) -> Self {
        Self {
            session,
            csrf,
            throttler,
            headers: ResponseHeaders::new(),
            logged_in_key: logged_in_key.into(),
        }
    }

    pub fn session(&self) -> &SessionStore<R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionStore<R> {
        &mut self.session
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    /// Issue a CSRF token for the current request
    pub fn issue_csrf_token(&mut self) -> SecurityResult<String> {
        self.csrf.initialize(&mut self.session)
    }

    /// Gate a state-changing request
    ///
    /// Verifies the CSRF token, then consumes one unit of the client's rate
    /// budget. The `X-RateLimit-*` headers are set whether or not the
    /// request is accepted.
    pub async fn request_pre_run(
        &mut self,
        fields: &FormFields,
    ) -> SecurityResult<RateLimitDecision> {
        self.csrf.verify(&self.session, fields)?;

        if self.headers.is_sent() {
            return Err(SecurityError::HeadersAlreadySent);
        }

        let decision = self.throttler.consume(1).await?;
        for (name, value) in decision.headers() {
            self.headers.set(name, &value)?;
        }

        if !decision.accepted {
            tracing::warn!(
                identity = %self.throttler.identity(),
                retry_after = decision.retry_after,
                "Too many requests"
            );
            return Err(SecurityError::RateLimitExceeded { decision });
        }

        Ok(decision)
    }

    /// Apply the hardening headers
    ///
    /// With `only_for_logged_in` the headers are applied only when the
    /// session marks the user as logged in. Returns whether they were applied.
    pub fn apply_security_headers(&mut self, only_for_logged_in: bool) -> SecurityResult<bool> {
        if self.headers.is_sent() {
            return Err(SecurityError::HeadersAlreadySent);
        }

        let logged_in = self
            .session
            .value(&self.logged_in_key)
            .is_some_and(is_truthy);
        if only_for_logged_in && !logged_in {
            return Ok(false);
        }

        for (name, value) in SECURITY_HEADERS {
            self.headers.set(name, value)?;
        }
        Ok(true)
    }

    /// Harden the session cookie: HttpOnly, the given SameSite policy,
    /// Secure when `enforce_https`, and identifiers accepted from the
    /// cookie only
    pub fn enforce_session_security_config(&mut self, same_site: SameSite, enforce_https: bool) {
        self.session.harden(same_site, enforce_https);
    }

    /// Persist the session and take the response headers, cookies included
    pub async fn finish(mut self) -> SecurityResult<HeaderMap> {
        self.session.commit().await?;
        for cookie in self.session.drain_cookies() {
            self.headers.set_cookie(&cookie)?;
        }
        self.headers.mark_sent();
        Ok(self.headers.into_inner())
    }
}
