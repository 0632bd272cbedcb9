//! Immutable client configuration.
//!
//! A [`ClientConfig`] is built once per client by
//! [`ClientBuilder`](super::ClientBuilder): the defaults below, with the
//! caller's overrides merged in. Header and cookie merging follows one rule
//! at both levels (client defaults ← builder overrides, and client ←
//! request): an override wins per key, every other base key is retained.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT,
};

use crate::http::Request;

// ============================================================================
// Defaults
// ============================================================================

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of retries after a timed-out attempt.
pub const DEFAULT_RETRY: u32 = 1;

/// Default cap on concurrently executing requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default cap on concurrently executing requests per host.
pub const DEFAULT_CONCURRENCY_PER_HOST: usize = 2;

/// Default `User-Agent`.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.169 Safari/537.36";

const DEFAULT_ACCEPT: &str = "*/*";
const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7,ja;q=0.6,zh-TW;q=0.5";

/// Headers every client starts from.
#[must_use]
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));
    headers
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Settings fixed at client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub(crate) timeout: Duration,
    pub(crate) retry: u32,
    pub(crate) concurrency: usize,
    pub(crate) concurrency_per_host: usize,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: DEFAULT_RETRY,
            concurrency: DEFAULT_CONCURRENCY,
            concurrency_per_host: DEFAULT_CONCURRENCY_PER_HOST,
            headers: default_headers(),
            cookies: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Default per-attempt timeout.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Default retry count.
    #[inline]
    #[must_use]
    pub const fn retry(&self) -> u32 {
        self.retry
    }

    /// Global concurrency cap.
    #[inline]
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Per-host concurrency cap.
    #[inline]
    #[must_use]
    pub const fn concurrency_per_host(&self) -> usize {
        self.concurrency_per_host
    }

    /// Default headers.
    #[inline]
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Default cookies.
    #[inline]
    #[must_use]
    pub const fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// The request's timeout override, or the client default.
    #[must_use]
    pub fn effective_timeout(&self, request: &Request) -> Duration {
        request.timeout().unwrap_or(self.timeout)
    }

    /// The request's retry override, or the client default.
    #[must_use]
    pub fn effective_retry(&self, request: &Request) -> u32 {
        request.retry().unwrap_or(self.retry)
    }

    /// Client headers overridden by the request's.
    #[must_use]
    pub fn effective_headers(&self, request: &Request) -> HeaderMap {
        merge_headers(&self.headers, request.headers())
    }

    /// Client cookies overridden by the request's.
    #[must_use]
    pub fn effective_cookies(&self, request: &Request) -> BTreeMap<String, String> {
        merge_cookies(&self.cookies, request.cookies())
    }
}

// ============================================================================
// Merge Rules
// ============================================================================

/// Merges `overrides` into `base`.
///
/// Names are compared case-insensitively. Every value of an overridden name
/// is replaced by the override's values; other names keep theirs.
#[must_use]
pub fn merge_headers(base: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for name in overrides.keys() {
        merged.remove(name);
    }
    for (name, value) in overrides {
        merged.append(name.clone(), value.clone());
    }
    merged
}

/// Merges `overrides` into `base`, override winning per name.
#[must_use]
pub fn merge_cookies(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Renders cookies as a single `Cookie` header value.
pub(crate) fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let pairs: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
    Some(pairs.join("; "))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use reqwest::header::HeaderName;

    use crate::http::request::parse_headers;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        parse_headers(&owned).unwrap()
    }

    #[test]
    fn test_request_header_overrides_default() {
        let base = headers(&[("A", "0"), ("B", "2")]);
        let overrides = headers(&[("A", "1")]);

        let merged = merge_headers(&base, &overrides);

        assert_eq!(merged, headers(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_header_merge_is_case_insensitive() {
        let base = headers(&[("User-Agent", "x")]);
        let overrides = headers(&[("user-agent", "y")]);
        let merged = merge_headers(&base, &overrides);
        assert_eq!(merged.get_all(USER_AGENT).iter().count(), 1);
        assert_eq!(merged[USER_AGENT], "y");
    }

    #[test]
    fn test_cookie_merge() {
        let base = BTreeMap::from([("ck".to_string(), "cv".to_string())]);
        let overrides = BTreeMap::from([
            ("a".to_string(), "b".to_string()),
            ("ck".to_string(), "new".to_string()),
        ]);
        let merged = merge_cookies(&base, &overrides);
        assert_eq!(cookie_header(&merged).as_deref(), Some("a=b; ck=new"));
        assert_eq!(cookie_header(&BTreeMap::new()), None);
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert_eq!(config.retry(), 1);
        assert_eq!(config.concurrency(), 4);
        assert_eq!(config.concurrency_per_host(), 2);
        assert_eq!(config.headers()[ACCEPT], "*/*");
        assert!(config.headers().contains_key(USER_AGENT));
        assert!(config.cookies().is_empty());
    }

    #[test]
    fn test_effective_values_prefer_request() {
        let config = ClientConfig::default();
        let plain = Request::get("http://a.test/").build().unwrap();
        let custom = Request::get("http://a.test/")
            .timeout(Duration::from_millis(250))
            .retry(0)
            .header("Accept", "text/html")
            .build()
            .unwrap();

        assert_eq!(config.effective_timeout(&plain), DEFAULT_TIMEOUT);
        assert_eq!(config.effective_retry(&plain), DEFAULT_RETRY);
        assert_eq!(config.effective_timeout(&custom), Duration::from_millis(250));
        assert_eq!(config.effective_retry(&custom), 0);

        let effective = config.effective_headers(&custom);
        assert_eq!(effective[ACCEPT], "text/html");
        assert!(effective.contains_key(USER_AGENT));
    }

    proptest! {
        #[test]
        fn prop_merge_keeps_base_and_applies_overrides(
            base in prop::collection::btree_map("[a-e]", "[a-z0-9]{1,4}", 0..5),
            overrides in prop::collection::btree_map("[a-e]", "[a-z0-9]{1,4}", 0..5),
        ) {
            let to_map = |m: &BTreeMap<String, String>| {
                let pairs: Vec<(String, String)> =
                    m.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                parse_headers(&pairs).unwrap()
            };
            let merged = merge_headers(&to_map(&base), &to_map(&overrides));

            for (k, v) in &overrides {
                let name = HeaderName::from_bytes(k.as_bytes()).unwrap();
                prop_assert_eq!(merged.get_all(&name).iter().count(), 1);
                prop_assert_eq!(merged[&name].to_str().unwrap(), v.as_str());
            }
            for (k, v) in base.iter().filter(|(k, _)| !overrides.contains_key(*k)) {
                let name = HeaderName::from_bytes(k.as_bytes()).unwrap();
                prop_assert_eq!(merged[&name].to_str().unwrap(), v.as_str());
            }
            let expected: std::collections::BTreeSet<&String> =
                base.keys().chain(overrides.keys()).collect();
            prop_assert_eq!(merged.keys_len(), expected.len());
        }
    }
}
