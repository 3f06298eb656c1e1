//! Stress run configuration.

use crate::error::KitError;
use crate::input::require_url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Validated settings for one stress run. Build with [`StressConfig::builder`].
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub url: Url,
    /// Simulated users once fully ramped up.
    pub users: usize,
    pub duration: Duration,
    /// Users are added linearly over this period; zero starts everyone at once.
    pub ramp_up: Duration,
    /// Pause between a user's requests.
    pub delay: Duration,
    /// Per-request timeout, covering connect through the last body byte.
    pub timeout: Duration,
    pub method: Method,
    pub headers: HeaderMap,
    /// Only set for methods that carry a body.
    pub body: Option<String>,
    /// Where to save the JSON report.
    pub output: Option<PathBuf>,
}

impl StressConfig {
    pub fn builder(url: impl Into<String>) -> StressConfigBuilder {
        StressConfigBuilder {
            url: url.into(),
            users: 10,
            duration_secs: 60,
            ramp_up_secs: 0,
            delay_ms: 1000,
            timeout_ms: 5000,
            method: "GET".to_string(),
            headers_json: "{}".to_string(),
            body: None,
            output: None,
        }
    }

    /// Upper bound shown on the progress bar: one request per user per second.
    pub fn estimated_requests(&self) -> u64 {
        self.users as u64 * self.duration.as_secs()
    }
}

/// Builder for [`StressConfig`]. Defaults: 10 users, 60 s, no ramp-up,
/// 1000 ms delay, 5000 ms timeout, `GET`, no headers.
#[derive(Debug, Clone)]
pub struct StressConfigBuilder {
    url: String,
    users: usize,
    duration_secs: u64,
    ramp_up_secs: u64,
    delay_ms: u64,
    timeout_ms: u64,
    method: String,
    headers_json: String,
    body: Option<String>,
    output: Option<PathBuf>,
}

impl StressConfigBuilder {
    pub fn users(mut self, n: usize) -> Self {
        self.users = n;
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn ramp_up_secs(mut self, secs: u64) -> Self {
        self.ramp_up_secs = secs;
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Request headers as a JSON object of strings, e.g. `{"X-Key": "abc"}`.
    pub fn headers_json(mut self, json: impl Into<String>) -> Self {
        self.headers_json = json.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StressConfig, KitError> {
        let url = require_url(&self.url).map_err(|e| KitError::InvalidConfig(e.to_string()))?;
        if self.users == 0 {
            return Err(KitError::InvalidConfig("Users must be ≥ 1".into()));
        }
        if self.duration_secs == 0 {
            return Err(KitError::InvalidConfig("Duration must be ≥ 1 second".into()));
        }
        if self.timeout_ms == 0 {
            return Err(KitError::InvalidConfig("Timeout must be ≥ 1 ms".into()));
        }

        let method = Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| KitError::InvalidConfig(format!("Invalid HTTP method '{}'", self.method)))?;
        let headers = parse_headers(&self.headers_json)?;
        let body = self.body.filter(|_| method_has_body(&method));

        Ok(StressConfig {
            url,
            users: self.users,
            duration: Duration::from_secs(self.duration_secs),
            ramp_up: Duration::from_secs(self.ramp_up_secs),
            delay: Duration::from_millis(self.delay_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            method,
            headers,
            body,
            output: self.output,
        })
    }
}

/// Whether requests with `method` carry the configured body.
pub fn method_has_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Parse a JSON object of header names to string values.
pub fn parse_headers(json: &str) -> Result<HeaderMap, KitError> {
    let raw: BTreeMap<String, String> = serde_json::from_str(json).map_err(|e| {
        KitError::InvalidConfig(format!("Headers must be a JSON object of strings: {e}"))
    })?;

    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| KitError::InvalidConfig(format!("Invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| KitError::InvalidConfig(format!("Invalid value for header '{name}'")))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StressConfig::builder("https://example.com").build().unwrap();
        assert_eq!(c.users, 10);
        assert_eq!(c.duration, Duration::from_secs(60));
        assert_eq!(c.ramp_up, Duration::ZERO);
        assert_eq!(c.delay, Duration::from_millis(1000));
        assert_eq!(c.timeout, Duration::from_millis(5000));
        assert_eq!(c.method, Method::GET);
        assert!(c.headers.is_empty());
        assert!(c.body.is_none());
        assert_eq!(c.estimated_requests(), 600);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(StressConfig::builder("ftp://example.com").build().is_err());
        assert!(StressConfig::builder("https://x.test").users(0).build().is_err());
        assert!(StressConfig::builder("https://x.test").duration_secs(0).build().is_err());
        assert!(StressConfig::builder("https://x.test").timeout_ms(0).build().is_err());
        assert!(StressConfig::builder("https://x.test").method("GE T").build().is_err());
        assert!(StressConfig::builder("https://x.test").headers_json("[1]").build().is_err());
    }

    #[test]
    fn method_is_case_insensitive() {
        let c = StressConfig::builder("https://x.test").method("post").build().unwrap();
        assert_eq!(c.method, Method::POST);
    }

    #[test]
    fn body_only_for_methods_that_carry_one() {
        let get = StressConfig::builder("https://x.test").body("{}").build().unwrap();
        assert!(get.body.is_none());
        let put = StressConfig::builder("https://x.test")
            .method("PUT")
            .body("{\"a\":1}")
            .build()
            .unwrap();
        assert_eq!(put.body.as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn headers_from_json() {
        let h = parse_headers(r#"{"Content-Type": "application/json", "X-Trace": "1"}"#).unwrap();
        assert_eq!(h.get("content-type").unwrap(), "application/json");
        assert_eq!(h.get("x-trace").unwrap(), "1");
        assert!(parse_headers(r#"{"Bad Name": "v"}"#).is_err());
        assert!(parse_headers(r#"{"X-Num": 5}"#).is_err());
    }
}
