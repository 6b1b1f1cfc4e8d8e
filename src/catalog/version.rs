//! Version resolution: github release lookup (cached), Helm repo index
//! lookup, or a fixed literal — the three strategies a `VersionSource` can
//! declare.

use std::time::Duration;

use moka::future::Cache;
use reqwest::Client;
use serde_json::Value;

use crate::error::XanthusError;

use super::VersionSource;

#[derive(Clone)]
pub struct VersionResolver {
    http: Client,
    github_cache: Cache<String, String>,
}

impl VersionResolver {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            http: Client::new(),
            github_cache: Cache::builder().time_to_live(cache_ttl).build(),
        }
    }

    pub async fn resolve(&self, source: &VersionSource) -> Result<String, XanthusError> {
        match source.kind.as_str() {
            "fixed" => source
                .value
                .clone()
                .ok_or_else(|| XanthusError::BadInput("fixed version_source missing value".into())),
            "github" => self.resolve_github(source).await,
            "helm" => self.resolve_helm(source).await,
            other => Err(XanthusError::BadInput(format!("unknown version_source type `{other}`"))),
        }
    }

    async fn resolve_github(&self, source: &VersionSource) -> Result<String, XanthusError> {
        let pattern = source.pattern.clone().unwrap_or_else(|| "v*".to_string());
        let cache_key = format!("{}:{}", source.source, pattern);
        if let Some(cached) = self.github_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let url = format!("https://api.github.com/repos/{}/releases", source.source);
        let response = self
            .http
            .get(&url)
            .header("User-Agent", "xanthus")
            .send()
            .await
            .map_err(|e| XanthusError::ProviderUnreachable {
                provider: "github".into(),
                source: e.into(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "github".into(),
                status: status.as_u16(),
                message: "failed to list releases".into(),
            });
        }
        let releases: Vec<Value> = response.json().await.unwrap_or_default();
        let glob = glob_to_prefix_suffix(&pattern);
        let tag = releases
            .iter()
            .filter_map(|r| r.get("tag_name").and_then(Value::as_str))
            .find(|t| matches_glob(t, &glob))
            .ok_or_else(|| XanthusError::NotFound(format!("release matching `{pattern}`")))?
            .to_string();

        self.github_cache.insert(cache_key, tag.clone()).await;
        Ok(tag)
    }

    async fn resolve_helm(&self, source: &VersionSource) -> Result<String, XanthusError> {
        let url = format!("{}/index.yaml", source.source.trim_end_matches('/'));
        let response = self.http.get(&url).send().await.map_err(|e| XanthusError::ProviderUnreachable {
            provider: "helm-repo".into(),
            source: e.into(),
        })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "helm-repo".into(),
                status: status.as_u16(),
                message: "failed to fetch repo index".into(),
            });
        }
        let index: Value = serde_yaml::from_str(&text)
            .map_err(|_| XanthusError::ProviderError {
                provider: "helm-repo".into(),
                status: 500,
                message: "malformed index.yaml".into(),
            })?;
        index
            .get("entries")
            .and_then(|entries| entries.as_object())
            .and_then(|entries| entries.values().next())
            .and_then(|versions| versions.as_array())
            .and_then(|versions| versions.first())
            .and_then(|v| v.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| XanthusError::NotFound("chart version in repo index".into()))
    }
}

/// Only the one glob shape the descriptor format uses (`v*`) needs support:
/// a single trailing `*`. Split into a required prefix and suffix.
fn glob_to_prefix_suffix(pattern: &str) -> (String, String) {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => (prefix.to_string(), suffix.to_string()),
        None => (pattern.to_string(), String::new()),
    }
}

fn matches_glob(candidate: &str, (prefix, suffix): &(String, String)) -> bool {
    candidate.starts_with(prefix.as_str()) && candidate.ends_with(suffix.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_strategy_returns_literal_value() {
        let resolver = VersionResolver::new(Duration::from_secs(600));
        let source = VersionSource {
            kind: "fixed".into(),
            source: String::new(),
            pattern: None,
            value: Some("4.20.0".into()),
        };
        assert_eq!(resolver.resolve(&source).await.unwrap(), "4.20.0");
    }

    #[test]
    fn glob_matches_v_prefixed_tags() {
        let glob = glob_to_prefix_suffix("v*");
        assert!(matches_glob("v1.2.3", &glob));
        assert!(!matches_glob("1.2.3", &glob));
    }
}
