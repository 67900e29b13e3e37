//! CSRF Guard
//!
//! Issues a per-session token bound to the URI it was issued for, and
//! verifies submitted tokens against both.

use platform::crypto::{constant_time_eq, random_token};
use serde_json::Value;

use crate::application::config::CsrfConfig;
use crate::application::session_store::SessionStore;
use crate::domain::form::FormFields;
use crate::domain::repository::SessionRepository;
use crate::error::{SecurityError, SecurityResult};

/// Token entropy in bytes
pub const TOKEN_BYTES: usize = 33;

#[derive(Debug, Clone, Default)]
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Fresh token: 33 bytes from the OS CSPRNG, URL-safe Base64 without padding
    pub fn generate(&self) -> String {
        random_token(TOKEN_BYTES)
    }

    /// Issue a token for the current request URI and store both in the session
    pub fn initialize<R>(&self, session: &mut SessionStore<R>) -> SecurityResult<String>
    where
        R: SessionRepository,
    {
        ensure_active(session)?;

        let token = self.generate();
        let origin = session.context().origin_uri().to_string();
        session.put(self.config.token_key.clone(), token.clone());
        session.put(self.config.origin_key.clone(), origin);

        tracing::debug!(origin = %session.context().origin_uri(), "CSRF token issued");
        Ok(token)
    }

    /// Verify the submitted token against the stored token and origin
    ///
    /// The stored token is left in place.
    pub fn verify<R>(&self, session: &SessionStore<R>, fields: &FormFields) -> SecurityResult<()>
    where
        R: SessionRepository,
    {
        ensure_active(session)?;

        let submitted = fields
            .get(&self.config.token_key)
            .ok_or(SecurityError::MissingToken)?;
        let stored = session
            .value(&self.config.token_key)
            .and_then(Value::as_str)
            .ok_or(SecurityError::NoStoredToken)?;

        if !constant_time_eq(submitted.as_bytes(), stored.as_bytes()) {
            tracing::warn!(client = %session.context().identity(), "CSRF token mismatch");
            return Err(SecurityError::InvalidToken);
        }

        let stored_origin = session
            .value(&self.config.origin_key)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let current_origin = session.context().origin_uri();
        if !constant_time_eq(stored_origin.as_bytes(), current_origin.as_bytes()) {
            tracing::warn!(
                client = %session.context().identity(),
                origin = %current_origin,
                "CSRF token used from a different origin"
            );
            return Err(SecurityError::OriginMismatch);
        }

        Ok(())
    }

    /// Hidden form input carrying the token
    pub fn render_field(&self, token: &str) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            html_escape::encode_double_quoted_attribute(&self.config.token_key),
            html_escape::encode_double_quoted_attribute(token),
        )
    }
}

fn ensure_active<R>(session: &SessionStore<R>) -> SecurityResult<()>
where
    R: SessionRepository,
{
    if session.exists() {
        Ok(())
    } else {
        Err(SecurityError::SessionNotActive)
    }
}
