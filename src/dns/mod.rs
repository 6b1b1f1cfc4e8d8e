//! REST client for the DNS/TLS provider: zone lookup, origin-certificate
//! issuance, SSL-mode and `always_use_https` toggles, page rules, and the
//! namespaced KV API that backs the whole persistence layer.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::XanthusError;
use crate::kv::KvStore;
use crate::model::DomainSSLRecord;
use crate::vault;

const KV_NAMESPACE_TITLE: &str = "Xanthus";
const ORIGIN_CERT_VALIDITY_DAYS: u32 = 5475;
const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);
const DOMAIN_KEY_PREFIX: &str = "domain:";

fn domain_key(fqdn: &str) -> String {
    format!("{DOMAIN_KEY_PREFIX}{fqdn}:ssl_config")
}

/// Persists a `DomainSSLRecord` under `domain:<fqdn>:ssl_config`, envelope
/// encrypted the same way every other KV entry is.
pub async fn put_domain(
    kv: &KvStore,
    credential: &str,
    record: &DomainSSLRecord,
) -> Result<(), XanthusError> {
    let encoded = serde_json::to_string(record)
        .map_err(|_| XanthusError::BadInput("failed to encode domain record".into()))?;
    vault::kv_put(kv, &domain_key(&record.fqdn), &encoded, credential).await
}

pub async fn get_domain(
    kv: &KvStore,
    credential: &str,
    fqdn: &str,
) -> Result<Option<DomainSSLRecord>, XanthusError> {
    match vault::kv_get_optional(kv, &domain_key(fqdn), credential).await? {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).map_err(|_| XanthusError::BadInput("corrupt domain record".into()))?,
        )),
        None => Ok(None),
    }
}

pub async fn list_domains(kv: &KvStore, credential: &str) -> Result<Vec<DomainSSLRecord>, XanthusError> {
    let keys = vault::kv_list(kv, DOMAIN_KEY_PREFIX).await?;
    let mut domains = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(raw) = vault::kv_get_optional(kv, &key, credential).await? {
            if let Ok(record) = serde_json::from_str(&raw) {
                domains.push(record);
            }
        }
    }
    Ok(domains)
}

pub async fn delete_domain(kv: &KvStore, fqdn: &str) -> Result<(), XanthusError> {
    vault::kv_delete(kv, &domain_key(fqdn)).await
}

pub struct DnsClient {
    http: Client,
    base_url: String,
}

impl DnsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.bearer_auth(token)
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> Result<Value, XanthusError> {
        let response = builder.send().await.map_err(|e| XanthusError::ProviderUnreachable {
            provider: "dns".into(),
            source: e.into(),
        })?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "dns".into(),
                status: status.as_u16(),
                message: body
                    .get("errors")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| status.to_string()),
            });
        }
        Ok(body)
    }

    // ---- credential / namespace --------------------------------------

    pub async fn verify_credential(&self, token: &str) -> Result<bool, XanthusError> {
        let builder = self
            .http
            .get(self.url("/user/tokens/verify"))
            .timeout(VERIFY_TIMEOUT);
        match self.send_json(self.auth(builder, token)).await {
            Ok(_) => Ok(true),
            Err(XanthusError::ProviderError { status, .. }) if status == 401 || status == 403 => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn ensure_namespace(&self, token: &str) -> Result<String, XanthusError> {
        let builder = self.http.get(self.url("/storage/kv/namespaces"));
        let body = self.send_json(self.auth(builder, token)).await?;
        let namespaces = body.get("result").and_then(Value::as_array).cloned().unwrap_or_default();
        if let Some(existing) = namespaces
            .iter()
            .find(|ns| ns.get("title").and_then(Value::as_str) == Some(KV_NAMESPACE_TITLE))
        {
            if let Some(id) = existing.get("id").and_then(Value::as_str) {
                return Ok(id.to_string());
            }
        }

        let builder = self
            .http
            .post(self.url("/storage/kv/namespaces"))
            .json(&json!({ "title": KV_NAMESPACE_TITLE }));
        let created = self.send_json(self.auth(builder, token)).await?;
        created
            .get("result")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or(XanthusError::ProviderError {
                provider: "dns".into(),
                status: 500,
                message: "namespace create response missing id".into(),
            })
    }

    // ---- KV ------------------------------------------------------------

    pub async fn kv_put(
        &self,
        token: &str,
        namespace_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), XanthusError> {
        let builder = self
            .http
            .put(self.url(&format!("/storage/kv/namespaces/{namespace_id}/values/{key}")))
            .body(value.to_string());
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    pub async fn kv_get(
        &self,
        token: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<Option<String>, XanthusError> {
        let builder = self
            .http
            .get(self.url(&format!("/storage/kv/namespaces/{namespace_id}/values/{key}")));
        let response = self.auth(builder, token).send().await.map_err(|e| {
            XanthusError::ProviderUnreachable {
                provider: "dns".into(),
                source: e.into(),
            }
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "dns".into(),
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(Some(text))
    }

    pub async fn kv_delete(
        &self,
        token: &str,
        namespace_id: &str,
        key: &str,
    ) -> Result<(), XanthusError> {
        let builder = self
            .http
            .delete(self.url(&format!("/storage/kv/namespaces/{namespace_id}/values/{key}")));
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    /// Pages through `keys?prefix=…&cursor=…` until the provider stops
    /// returning a `cursor`.
    pub async fn kv_list(
        &self,
        token: &str,
        namespace_id: &str,
        prefix: &str,
    ) -> Result<Vec<String>, XanthusError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut builder = self
                .http
                .get(self.url(&format!("/storage/kv/namespaces/{namespace_id}/keys")))
                .query(&[("prefix", prefix)]);
            if let Some(c) = &cursor {
                builder = builder.query(&[("cursor", c)]);
            }
            let body = self.send_json(self.auth(builder, token)).await?;
            let page = body.get("result").and_then(Value::as_array).cloned().unwrap_or_default();
            for item in &page {
                if let Some(name) = item.get("name").and_then(Value::as_str) {
                    keys.push(name.to_string());
                }
            }
            cursor = body
                .get("result_info")
                .and_then(|i| i.get("cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(keys)
    }

    // ---- zones / TLS -----------------------------------------------------

    async fn zone_id_for(&self, token: &str, fqdn: &str) -> Result<String, XanthusError> {
        let apex = apex_of(fqdn);
        let builder = self
            .http
            .get(self.url("/zones"))
            .query(&[("name", apex.as_str())]);
        let body = self.send_json(self.auth(builder, token)).await?;
        body.get("result")
            .and_then(Value::as_array)
            .and_then(|zones| zones.first())
            .and_then(|z| z.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| XanthusError::NotFound(format!("zone for {apex}")))
    }

    async fn create_origin_cert(
        &self,
        token: &str,
        fqdn: &str,
        csr_pem: &str,
    ) -> Result<(String, String), XanthusError> {
        let builder = self.http.post(self.url("/certificates")).json(&json!({
            "hostnames": [fqdn, format!("*.{fqdn}")],
            "request_type": "origin-rsa",
            "requested_validity": ORIGIN_CERT_VALIDITY_DAYS,
            "csr": csr_pem,
        }));
        let body = self.send_json(self.auth(builder, token)).await?;
        let cert_id = body
            .get("result")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .ok_or(XanthusError::ProviderError {
                provider: "dns".into(),
                status: 500,
                message: "origin cert response missing id".into(),
            })?
            .to_string();
        let certificate = body
            .get("result")
            .and_then(|r| r.get("certificate"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok((cert_id, certificate))
    }

    async fn revoke_origin_cert(&self, token: &str, cert_id: &str) -> Result<(), XanthusError> {
        let builder = self
            .http
            .delete(self.url(&format!("/certificates/{cert_id}")));
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    async fn download_root_ca(&self, token: &str) -> Result<String, XanthusError> {
        let builder = self.http.get(self.url("/origin_ca/root_certificate"));
        let body = self.send_json(self.auth(builder, token)).await?;
        Ok(body
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn set_ssl_mode(&self, token: &str, zone_id: &str, mode: &str) -> Result<(), XanthusError> {
        let builder = self
            .http
            .patch(self.url(&format!("/zones/{zone_id}/settings/ssl")))
            .json(&json!({ "value": mode }));
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    async fn set_always_use_https(
        &self,
        token: &str,
        zone_id: &str,
        on: bool,
    ) -> Result<(), XanthusError> {
        let builder = self
            .http
            .patch(self.url(&format!("/zones/{zone_id}/settings/always_use_https")))
            .json(&json!({ "value": if on { "on" } else { "off" } }));
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    async fn create_redirect_page_rule(
        &self,
        token: &str,
        zone_id: &str,
        fqdn: &str,
    ) -> Result<String, XanthusError> {
        let builder = self.http.post(self.url(&format!("/zones/{zone_id}/pagerules"))).json(&json!({
            "targets": [{
                "target": "url",
                "constraint": { "operator": "matches", "value": format!("www.{fqdn}/*") }
            }],
            "actions": [{
                "id": "forwarding_url",
                "value": { "url": format!("https://{fqdn}/$1"), "status_code": 301 }
            }],
            "priority": 1,
            "status": "active",
        }));
        let body = self.send_json(self.auth(builder, token)).await?;
        body.get("result")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(XanthusError::ProviderError {
                provider: "dns".into(),
                status: 500,
                message: "page rule response missing id".into(),
            })
    }

    async fn delete_page_rule(&self, token: &str, zone_id: &str, rule_id: &str) -> Result<(), XanthusError> {
        let builder = self
            .http
            .delete(self.url(&format!("/zones/{zone_id}/pagerules/{rule_id}")));
        self.send_json(self.auth(builder, token)).await?;
        Ok(())
    }

    /// Finds a page rule whose sole target matches `www.<fqdn>/*`, leaving
    /// other rules untouched on ambiguity.
    async fn find_redirect_page_rule(
        &self,
        token: &str,
        zone_id: &str,
        fqdn: &str,
    ) -> Result<Option<String>, XanthusError> {
        let builder = self.http.get(self.url(&format!("/zones/{zone_id}/pagerules")));
        let body = self.send_json(self.auth(builder, token)).await?;
        let target_value = format!("www.{fqdn}/*");
        let rules = body.get("result").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(rules
            .into_iter()
            .find(|rule| {
                rule.get("targets")
                    .and_then(Value::as_array)
                    .and_then(|targets| targets.first())
                    .and_then(|t| t.get("constraint"))
                    .and_then(|c| c.get("value"))
                    .and_then(Value::as_str)
                    == Some(target_value.as_str())
            })
            .and_then(|rule| rule.get("id").and_then(Value::as_str).map(str::to_string)))
    }

    /// Transactional `configure_domain`: each step is undone in reverse
    /// order if a later step fails.
    pub async fn configure_domain(
        &self,
        token: &str,
        fqdn: &str,
        csr_pem: &str,
        shared_private_key_pem: &str,
    ) -> Result<DomainSSLRecord, XanthusError> {
        let zone_id = self.zone_id_for(token, fqdn).await?;

        let mut applied: Vec<&'static str> = Vec::new();
        let mut cert_id: Option<String> = None;
        let result: Result<DomainSSLRecord, XanthusError> = async {
            let (id, leaf_cert) = self.create_origin_cert(token, fqdn, csr_pem).await?;
            cert_id = Some(id.clone());
            applied.push("origin_cert");

            let root_ca = self.download_root_ca(token).await.unwrap_or_default();
            let certificate_pem = format!("{leaf_cert}\n{root_ca}");

            self.set_ssl_mode(token, &zone_id, "strict").await?;
            applied.push("ssl_mode");

            self.set_always_use_https(token, &zone_id, true).await?;
            applied.push("always_use_https");

            self.create_redirect_page_rule(token, &zone_id, fqdn).await?;
            applied.push("page_rule");

            Ok(DomainSSLRecord {
                fqdn: fqdn.to_string(),
                zone_id: zone_id.clone(),
                origin_cert_id: id,
                certificate_pem,
                private_key_pem: shared_private_key_pem.to_string(),
                ssl_mode: "strict".to_string(),
                always_use_https: true,
                page_rule_created: true,
                configured_at: Utc::now(),
            })
        }
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(err) => {
                warn!(fqdn, ?applied, "configure_domain failed, rolling back");
                self.undo_configure_domain(token, &zone_id, fqdn, &applied, cert_id.as_deref())
                    .await;
                Err(err)
            }
        }
    }

    async fn undo_configure_domain(
        &self,
        token: &str,
        zone_id: &str,
        fqdn: &str,
        applied: &[&'static str],
        cert_id: Option<&str>,
    ) {
        for step in applied.iter().rev() {
            let outcome = match *step {
                "page_rule" => {
                    if let Ok(Some(id)) = self.find_redirect_page_rule(token, zone_id, fqdn).await {
                        self.delete_page_rule(token, zone_id, &id).await
                    } else {
                        Ok(())
                    }
                }
                "always_use_https" => self.set_always_use_https(token, zone_id, false).await,
                "ssl_mode" => self.set_ssl_mode(token, zone_id, "flexible").await,
                "origin_cert" => match cert_id {
                    Some(id) => self.revoke_origin_cert(token, id).await,
                    None => Ok(()),
                },
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                warn!(step, error = ?e, "rollback step failed");
            }
        }
    }

    /// Inverse of `configure_domain`. Best-effort: returns the steps that
    /// did NOT complete so the caller can surface `RollbackPartial`.
    pub async fn remove_domain(
        &self,
        token: &str,
        record: &DomainSSLRecord,
    ) -> Vec<&'static str> {
        let mut failed = Vec::new();

        match self
            .find_redirect_page_rule(token, &record.zone_id, &record.fqdn)
            .await
        {
            Ok(Some(id)) => {
                if self.delete_page_rule(token, &record.zone_id, &id).await.is_err() {
                    failed.push("page_rule");
                }
            }
            Ok(None) => {}
            Err(_) => failed.push("page_rule"),
        }

        if self.set_ssl_mode(token, &record.zone_id, "flexible").await.is_err() {
            failed.push("ssl_mode");
        }
        if self
            .set_always_use_https(token, &record.zone_id, false)
            .await
            .is_err()
        {
            failed.push("always_use_https");
        }
        if self
            .revoke_origin_cert(token, &record.origin_cert_id)
            .await
            .is_err()
        {
            failed.push("origin_cert");
        }

        if failed.is_empty() {
            info!(fqdn = %record.fqdn, "domain disenrolled cleanly");
        }
        failed
    }
}

fn apex_of(fqdn: &str) -> String {
    let parts: Vec<&str> = fqdn.split('.').collect();
    if parts.len() <= 2 {
        fqdn.to_string()
    } else {
        parts[parts.len() - 2..].join(".")
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_strips_subdomains() {
        assert_eq!(apex_of("ide.example.com"), "example.com");
        assert_eq!(apex_of("example.com"), "example.com");
        assert_eq!(apex_of("a.b.c.example.co.uk"), "co.uk");
    }
}
