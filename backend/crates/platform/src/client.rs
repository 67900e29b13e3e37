//! Client identification utilities
//!
//! Per-request client attributes captured from HTTP request parts, and the
//! fingerprint used to bind sessions to the client that created them.

use http::{HeaderMap, Uri, header};
use std::net::IpAddr;

use crate::cookie::parse_cookie;
use crate::crypto::{constant_time_eq, sha512_hex};

/// Placeholder for an attribute the client did not send
const ABSENT: &str = "-";

/// Kind of context a request is served in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    #[default]
    Http,
    /// Batch or command-line execution; sessions never exist here
    Cli,
}

/// Per-request client attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub kind: RequestKind,
    pub remote_addr: Option<IpAddr>,
    pub user_agent: Option<String>,
    /// Request path, without the query string
    pub path: Option<String>,
    pub query: Option<String>,
    /// Entry script, used as origin when no path is available
    pub script_name: Option<String>,
    /// All `Cookie` headers joined with `; `
    pub cookie_header: Option<String>,
}

impl RequestContext {
    /// Capture the context of an HTTP request
    ///
    /// `X-Forwarded-For` is honoured only when `trust_proxy` is set.
    pub fn from_parts(
        headers: &HeaderMap,
        uri: &Uri,
        direct_ip: Option<IpAddr>,
        trust_proxy: bool,
    ) -> Self {
        let remote_addr = if trust_proxy {
            extract_client_ip(headers, direct_ip)
        } else {
            direct_ip
        };

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let cookies: Vec<&str> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let cookie_header = (!cookies.is_empty()).then(|| cookies.join("; "));

        let path = Some(uri.path().to_string()).filter(|p| !p.is_empty());

        Self {
            kind: RequestKind::Http,
            remote_addr,
            user_agent,
            path,
            query: uri.query().map(str::to_string),
            script_name: None,
            cookie_header,
        }
    }

    /// Context of a command-line invocation
    pub fn cli(script_name: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Cli,
            script_name: Some(script_name.into()),
            ..Self::default()
        }
    }

    pub fn with_remote_addr(mut self, ip: IpAddr) -> Self {
        self.remote_addr = Some(ip);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set path and query from a request target such as `/login?next=/`
    pub fn with_target(mut self, target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => {
                self.path = Some(path.to_string());
                self.query = Some(query.to_string());
            }
            None => {
                self.path = Some(target.to_string());
                self.query = None;
            }
        }
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{}={}", name, value);
        self.cookie_header = Some(match self.cookie_header.take() {
            Some(existing) => format!("{}; {}", existing, pair),
            None => pair,
        });
        self
    }

    pub fn is_http(&self) -> bool {
        self.kind == RequestKind::Http
    }

    /// Cookie value sent by the client
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookie_header
            .as_deref()
            .and_then(|raw| parse_cookie(raw, name))
    }

    /// Decoded query-string parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// URI a CSRF token is bound to: the path, or the script name without one
    pub fn origin_uri(&self) -> &str {
        self.path
            .as_deref()
            .or(self.script_name.as_deref())
            .unwrap_or_default()
    }

    /// Client identity for rate limiting
    pub fn identity(&self) -> String {
        self.remote_addr
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| ABSENT.to_string())
    }
}

/// Client fingerprint bound into a session
///
/// Lowercase hex SHA-512 of `"{ip}|{user agent}"`, with `-` standing in for
/// attributes that are missing or excluded from validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFingerprint(String);

impl ClientFingerprint {
    pub fn compute(ctx: &RequestContext, validate_ip: bool, validate_ua: bool) -> Self {
        let ip = ctx
            .remote_addr
            .filter(|_| validate_ip)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| ABSENT.to_string());
        let ua = ctx
            .user_agent
            .as_deref()
            .filter(|_| validate_ua)
            .unwrap_or(ABSENT);

        Self(sha512_hex(format!("{}|{}", ip, ua).as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison with a stored fingerprint
    pub fn matches(&self, stored: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), stored.as_bytes())
    }
}

/// Extract client IP address from headers
///
/// Checks X-Forwarded-For header first (for reverse proxy setups),
/// then falls back to direct connection IP.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    // First IP in the list is the originating client
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first_ip) = xff.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    direct_ip
}
