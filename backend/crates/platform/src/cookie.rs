//! Cookie Management Infrastructure
//!
//! Session cookie issue and expiry. The expiring cookie must repeat every
//! scoping attribute of the original, otherwise browsers keep the original.

use std::str::FromStr;

/// Fixed past date used to expire cookies
pub const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// SameSite policy for cookies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite policy `{other}`")),
        }
    }
}

/// Cookie configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub path: String,
    pub domain: Option<String>,
    pub max_age_secs: Option<i64>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            domain: None,
            max_age_secs: None,
        }
    }
}

impl CookieConfig {
    /// Build Set-Cookie header value
    pub fn build_set_cookie(&self, value: &str) -> String {
        let mut cookie = format!("{}={}", self.name, value);

        if let Some(max_age) = self.max_age_secs {
            cookie.push_str(&format!("; Max-Age={}", max_age));
        }
        self.push_scope(&mut cookie);

        cookie
    }

    /// Build Set-Cookie header for deletion (expired)
    ///
    /// Carries the same Path/Domain/Secure/HttpOnly/SameSite as
    /// [`Self::build_set_cookie`] so the browser matches the original cookie.
    pub fn build_delete_cookie(&self) -> String {
        let mut cookie = format!("{}=; Expires={}; Max-Age=0", self.name, EXPIRED_DATE);
        self.push_scope(&mut cookie);
        cookie
    }

    fn push_scope(&self, cookie: &mut String) {
        cookie.push_str(&format!("; Path={}", self.path));
        if let Some(domain) = &self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str(&format!("; SameSite={}", self.same_site.as_str()));
    }
}

/// Find a cookie value in a raw `Cookie` header value
pub fn parse_cookie(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;

        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}
