//! `/dns/list`, `/dns/configure`, `/dns/remove`: enrolling and disenrolling
//! zones for TLS origination. `configure` is the one place the per-fqdn
//! mutex in `AppState` matters — two concurrent enrolments of the same
//! domain would otherwise race the provider's transactional steps.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::Identity;
use crate::dns;
use crate::error::{ServerError, XanthusError};
use crate::model::DomainSSLRecord;
use crate::vault;

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dns/list", get(list))
        .route("/dns/configure", post(configure))
        .route("/dns/remove", post(remove))
}

async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<DomainSSLRecord>>, ServerError> {
    let kv = state.kv_for(&identity);
    let domains = dns::list_domains(&kv, &identity.credential).await?;
    Ok(Json(domains))
}

#[derive(Debug, Deserialize)]
pub struct ConfigureDomainRequest {
    pub fqdn: String,
}

async fn configure(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ConfigureDomainRequest>,
) -> Result<Json<DomainSSLRecord>, ServerError> {
    let guard = state.domain_locks.lock_for(&payload.fqdn);
    let _permit = guard.lock().await;

    let kv = state.kv_for(&identity);
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;
    let record = state
        .dns
        .configure_domain(
            &identity.credential,
            &payload.fqdn,
            &shared_key.csr_pem,
            &shared_key.private_key_pem,
        )
        .await?;
    dns::put_domain(&kv, &identity.credential, &record).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct RemoveDomainRequest {
    pub fqdn: String,
}

/// Ids of ApplicationRecords whose fqdn falls under `domain` (equal to it,
/// or a subdomain of it), read directly off the KV the same way
/// `provision::app_ids_referencing_host` does for host teardown.
async fn app_ids_referencing_domain(
    kv: &crate::kv::KvStore,
    credential: &str,
    domain: &str,
) -> Result<Vec<String>, XanthusError> {
    let keys = vault::kv_list(kv, "app:").await?;
    let mut ids = Vec::new();
    for key in keys {
        if let Some(raw) = vault::kv_get_optional(kv, &key, credential).await? {
            if let Ok(app) = serde_json::from_str::<crate::model::ApplicationRecord>(&raw) {
                if app.fqdn == domain || app.fqdn.ends_with(&format!(".{domain}")) {
                    ids.push(app.id);
                }
            }
        }
    }
    Ok(ids)
}

async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<RemoveDomainRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let guard = state.domain_locks.lock_for(&payload.fqdn);
    let _permit = guard.lock().await;

    let kv = state.kv_for(&identity);
    let record = dns::get_domain(&kv, &identity.credential, &payload.fqdn)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("domain {}", payload.fqdn)))?;

    let referencing = app_ids_referencing_domain(&kv, &identity.credential, &payload.fqdn).await?;
    if !referencing.is_empty() {
        return Err(XanthusError::Conflict(format!(
            "{} application(s) still target this domain",
            referencing.len()
        ))
        .into());
    }

    let failed = state.dns.remove_domain(&identity.credential, &record).await;
    if !failed.is_empty() {
        return Err(XanthusError::RollbackPartial {
            attempted: vec!["page_rule".into(), "ssl_mode".into(), "always_use_https".into(), "origin_cert".into()],
            succeeded: vec![],
            failed: failed.into_iter().map(str::to_string).collect(),
        }
        .into());
    }

    dns::delete_domain(&kv, &payload.fqdn).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
