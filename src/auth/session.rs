//! Cookie-session scheme for the browser: the operator's DNS-provider
//! credential lives verbatim in a single cookie, and an in-process cache
//! spares a round-trip to the provider on every request.

use std::time::Duration;

use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::dns::DnsClient;
use crate::error::XanthusError;

pub const SESSION_COOKIE_NAME: &str = "xanthus_session";
const ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: String,
    pub secure: bool,
}

fn parse_cookies(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|c| c.trim().split_once('='))
}

pub fn create_session_cookie(credential: &str, settings: &CookieSettings) -> String {
    let mut parts = vec![
        format!("{SESSION_COOKIE_NAME}={credential}"),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];
    if !settings.domain.is_empty() {
        parts.push(format!("Domain={}", settings.domain));
    }
    if settings.secure {
        parts.push("Secure".to_string());
    }
    parts.join("; ")
}

pub fn clear_session_cookie(settings: &CookieSettings) -> String {
    let mut parts = vec![
        format!("{SESSION_COOKIE_NAME}="),
        "Max-Age=0".to_string(),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];
    if !settings.domain.is_empty() {
        parts.push(format!("Domain={}", settings.domain));
    }
    if settings.secure {
        parts.push("Secure".to_string());
    }
    parts.join("; ")
}

pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("cookie")?.to_str().ok()?;
    parse_cookies(header)
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
}

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub account_id: String,
    pub namespace_id: String,
}

/// Keyed by `SHA-256(credential)` rather than the raw credential, so a
/// cache dump never hands out a usable secret.
#[derive(Clone)]
pub struct AccountCache {
    cache: Cache<String, AccountInfo>,
}

fn cache_key(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    BASE64.encode(hasher.finalize())
}

impl AccountCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().time_to_live(ACCOUNT_CACHE_TTL).build(),
        }
    }

    /// Returns the cached account info for `credential`, verifying with the
    /// DNS provider and populating the cache on a miss. An invalid
    /// credential never gets cached.
    pub async fn resolve(&self, dns: &DnsClient, credential: &str) -> Result<AccountInfo, XanthusError> {
        let key = cache_key(credential);
        if let Some(info) = self.cache.get(&key) {
            return Ok(info);
        }

        if !dns.verify_credential(credential).await? {
            return Err(XanthusError::Unauthorised);
        }
        let namespace_id = dns.ensure_namespace(credential).await?;
        let info = AccountInfo {
            account_id: key.clone(),
            namespace_id,
        };
        self.cache.insert(key, info.clone());
        Ok(info)
    }
}

impl Default for AccountCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_contains_the_expected_attributes() {
        let settings = CookieSettings {
            domain: ".example.com".to_string(),
            secure: true,
        };
        let cookie = create_session_cookie("secret-credential", &settings);
        assert!(cookie.contains("xanthus_session=secret-credential"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Domain=.example.com"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let settings = CookieSettings {
            domain: String::new(),
            secure: false,
        };
        let cookie = clear_session_cookie(&settings);
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn extracts_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            "other=1; xanthus_session=abc123; more=2".parse().unwrap(),
        );
        assert_eq!(extract_session_cookie(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn missing_cookie_header_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_cookie(&headers), None);
    }
}
