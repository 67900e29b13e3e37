//! Session Entity
//!
//! Identifier, lifecycle state and data bag of a server-side session.

use std::fmt;

use platform::crypto::{from_base64_url, random_token};
use serde_json::Value;

/// Session data bag, persisted between requests
pub type SessionData = serde_json::Map<String, Value>;

/// Opaque session identifier (32 random bytes, URL-safe Base64)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Entropy of a generated identifier in bytes
    pub const BYTES: usize = 32;

    pub fn generate() -> Self {
        Self(random_token(Self::BYTES))
    }

    /// Accept only identifiers this module could have generated
    pub fn parse(raw: &str) -> Option<Self> {
        match from_base64_url(raw) {
            Ok(bytes) if bytes.len() == Self::BYTES => Some(Self(raw.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.short())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotStarted,
    /// Fingerprint validated or bound for the first time
    Active,
    Destroyed,
}

/// Loose truthiness of a stored value (`null`, `false`, `0`, `""`, `"0"`
/// and empty collections are false)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
