//! Application Configuration
//!
//! Configuration for the security application layer.

/// Re-export configuration types owned by platform
pub use platform::cookie::{CookieConfig, SameSite};
pub use platform::password::{Argon2Params, BcryptParams, HashAlgorithm, HasherConfig};
pub use platform::rate_limit::RateLimitConfig;

use std::time::Duration;

use crate::error::{SecurityError, SecurityResult};

/// Session configuration
///
/// The session name is the cookie name (`cookie.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session cookie attributes
    pub cookie: CookieConfig,
    /// Bind sessions to a client fingerprint
    pub fingerprinting: bool,
    /// Include the client IP in the fingerprint
    pub validate_ip: bool,
    /// Include the User-Agent in the fingerprint
    pub validate_ua: bool,
    /// Ignore session identifiers sent outside the cookie
    pub use_only_cookies: bool,
    /// Sessions untouched for longer than this are purged
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: CookieConfig::default(),
            fingerprinting: true,
            validate_ip: true,
            validate_ua: true,
            use_only_cookies: true,
            idle_timeout: Duration::from_secs(1440),
        }
    }
}

impl SessionConfig {
    /// Create config for a named session
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            cookie: CookieConfig {
                name: name.into(),
                ..CookieConfig::default()
            },
            ..Self::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        let mut config = Self::default();
        config.cookie.secure = false;
        config
    }

    pub fn name(&self) -> &str {
        &self.cookie.name
    }

    pub fn validate(&self) -> SecurityResult<()> {
        let name = self.name();
        if name.is_empty() {
            return Err(SecurityError::Config("session name must not be empty".to_string()));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(SecurityError::Config(format!(
                "session name `{name}` must be alphanumeric"
            )));
        }
        if self.cookie.same_site == SameSite::None && !self.cookie.secure {
            return Err(SecurityError::Config(
                "SameSite=None requires a Secure cookie".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(SecurityError::Config(
                "session idle timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// CSRF guard configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfConfig {
    /// Form field and session key holding the token
    pub token_key: String,
    /// Session key holding the URI the token was issued for
    pub origin_key: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_key: "token".to_string(),
            origin_key: "accessed_from".to_string(),
        }
    }
}

impl CsrfConfig {
    pub fn validate(&self) -> SecurityResult<()> {
        if self.token_key.is_empty() || self.origin_key.is_empty() {
            return Err(SecurityError::Config("CSRF keys must not be empty".to_string()));
        }
        if self.token_key == self.origin_key {
            return Err(SecurityError::Config(
                "CSRF token and origin keys must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Security application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub session: SessionConfig,
    pub csrf: CsrfConfig,
    pub rate_limit: RateLimitConfig,
    pub hasher: HasherConfig,
    /// Rate-limit namespace consumed by the request gate
    pub throttle_namespace: String,
    /// Session key marking an authenticated user
    pub logged_in_key: String,
    /// Trust `X-Forwarded-For` for the client address
    pub trust_proxy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            csrf: CsrfConfig::default(),
            rate_limit: RateLimitConfig::default(),
            hasher: HasherConfig::default(),
            throttle_namespace: "request".to_string(),
            logged_in_key: "logged_in".to_string(),
            trust_proxy: false,
        }
    }
}

impl SecurityConfig {
    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            session: SessionConfig::development(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SecurityResult<()> {
        self.session.validate()?;
        self.csrf.validate()?;
        self.rate_limit.validate()?;
        self.hasher.validate()?;
        if self.throttle_namespace.is_empty() {
            return Err(SecurityError::Config(
                "throttle namespace must not be empty".to_string(),
            ));
        }
        if self.logged_in_key.is_empty() {
            return Err(SecurityError::Config("logged-in key must not be empty".to_string()));
        }
        Ok(())
    }
}
