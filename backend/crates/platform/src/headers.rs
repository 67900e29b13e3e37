//! Response header sink
//!
//! Headers are collected here and flushed once with the response. After
//! [`ResponseHeaders::mark_sent`] every mutation is rejected.

use http::{HeaderMap, HeaderName, HeaderValue, header};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseHeaderError {
    #[error("Response headers were already sent")]
    HeadersAlreadySent,

    #[error("Invalid header name `{0}`")]
    InvalidName(String),

    #[error("Invalid value for header `{0}`")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    map: HeaderMap,
    sent: bool,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ResponseHeaderError> {
        let (name, value) = self.convert(name, value)?;
        self.map.insert(name, value);
        Ok(())
    }

    /// Add a header without replacing previous values
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), ResponseHeaderError> {
        let (name, value) = self.convert(name, value)?;
        self.map.append(name, value);
        Ok(())
    }

    /// Queue a `Set-Cookie` header
    pub fn set_cookie(&mut self, cookie: &str) -> Result<(), ResponseHeaderError> {
        self.append(header::SET_COOKIE.as_str(), cookie)
    }

    fn convert(
        &self,
        name: &str,
        value: &str,
    ) -> Result<(HeaderName, HeaderValue), ResponseHeaderError> {
        if self.sent {
            return Err(ResponseHeaderError::HeadersAlreadySent);
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ResponseHeaderError::InvalidName(name.to_string()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ResponseHeaderError::InvalidValue(name.to_string()))?;
        Ok((header_name, header_value))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.map
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Mark the headers as flushed to the client
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    pub fn into_inner(self) -> HeaderMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let mut headers = ResponseHeaders::new();
        headers.set("X-Frame-Options", "deny").unwrap();
        headers.set("X-Frame-Options", "sameorigin").unwrap();

        assert_eq!(headers.get("x-frame-options"), Some("sameorigin"));
        assert_eq!(headers.get_all("X-Frame-Options").len(), 1);
    }

    #[test]
    fn test_cookies_accumulate() {
        let mut headers = ResponseHeaders::new();
        headers.set_cookie("a=1; Path=/").unwrap();
        headers.set_cookie("b=2; Path=/").unwrap();

        assert_eq!(headers.get_all("set-cookie"), vec!["a=1; Path=/", "b=2; Path=/"]);
    }

    #[test]
    fn test_rejects_after_sent() {
        let mut headers = ResponseHeaders::new();
        headers.set("Pragma", "no-cache").unwrap();
        headers.mark_sent();

        assert!(headers.is_sent());
        assert_eq!(
            headers.set("Pragma", "no-cache"),
            Err(ResponseHeaderError::HeadersAlreadySent)
        );
        assert_eq!(
            headers.set_cookie("a=1"),
            Err(ResponseHeaderError::HeadersAlreadySent)
        );
        assert_eq!(headers.into_inner().len(), 1);
    }

    #[test]
    fn test_invalid_header() {
        let mut headers = ResponseHeaders::new();
        assert!(matches!(
            headers.set("bad name", "v"),
            Err(ResponseHeaderError::InvalidName(_))
        ));
        assert!(matches!(
            headers.set("X-Test", "line\nbreak"),
            Err(ResponseHeaderError::InvalidValue(_))
        ));
    }
}
