//! `/setup/hetzner`, `/vps/*` and `/ws/terminal` allocation: the thinnest
//! possible layer over `provision`, `iaas` and `ssh` (`State` + `Extension`
//! + `Json` in, `Result<Json<_>, ServerError>` out).

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Identity;
use crate::error::{ServerError, XanthusError};
use crate::iaas;
use crate::model::{HostRecord, IaasProviderKind};
use crate::provision::{self, CreateHostRequest};
use crate::ssh::PoolKey;
use crate::vault;

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/setup/hetzner", post(setup_hetzner))
        .route("/vps/list", get(list))
        .route("/vps/create", post(create))
        .route("/vps/delete", post(delete))
        .route("/vps/poweroff", post(power_off))
        .route("/vps/poweron", post(power_on))
        .route("/vps/reboot", post(reboot))
        .route("/vps/ssh-key", get(ssh_key))
        .route("/vps/{id}/status", get(status))
        .route("/vps/{id}/logs", get(logs))
        .route("/vps/{id}/configure", post(configure))
        .route("/vps/{id}/deploy", post(deploy_manifest))
        .route("/vps/{id}/terminal", post(open_terminal))
}

fn pool_key(record: &HostRecord) -> PoolKey {
    PoolKey::new(record.public_ipv4.clone(), record.ssh_port, record.ssh_user.clone())
}

async fn provider_credential(
    state: &AppState,
    identity: &Identity,
    kind: IaasProviderKind,
) -> Result<String, XanthusError> {
    let kv = state.kv_for(identity);
    let name = provision::provider_name(kind);
    vault::kv_get_optional(&kv, &vault::provider_credential_key(name), &identity.credential)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("{name} credential")))
}

#[derive(Debug, Deserialize)]
pub struct SetupProviderRequest {
    pub api_key: String,
}

async fn setup_hetzner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SetupProviderRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let provider = iaas::provider_for(IaasProviderKind::Hetzner);
    provider.list_locations(&payload.api_key).await?;

    let kv = state.kv_for(&identity);
    vault::kv_put(
        &kv,
        &vault::provider_credential_key("hetzner"),
        &payload.api_key,
        &identity.credential,
    )
    .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Serialize)]
struct HostWithCost {
    #[serde(flatten)]
    record: HostRecord,
    cost: f64,
}

async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<HostWithCost>>, ServerError> {
    let kv = state.kv_for(&identity);
    let hosts = provision::list_hosts(&kv, &identity.credential).await?;
    let now = chrono::Utc::now();
    let with_cost = hosts
        .into_iter()
        .map(|record| {
            let cost = crate::provision::cost::compute(record.created_at, record.hourly_rate, record.monthly_rate, now);
            HostWithCost { record, cost }
        })
        .collect();
    Ok(Json(with_cost))
}

#[derive(Debug, Deserialize)]
pub struct CreateVpsRequest {
    pub name: String,
    pub location: String,
    pub server_type: String,
    #[serde(default = "default_provider")]
    pub provider: IaasProviderKind,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_architecture")]
    pub architecture: String,
}

fn default_provider() -> IaasProviderKind {
    IaasProviderKind::Hetzner
}
fn default_ssh_user() -> String {
    "root".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_architecture() -> String {
    "amd64".to_string()
}

async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateVpsRequest>,
) -> Result<Json<HostRecord>, ServerError> {
    let kv = state.kv_for(&identity);
    let provider = iaas::provider_for(payload.provider);
    let record = provision::create_host(
        &kv,
        provider,
        &identity.credential,
        CreateHostRequest {
            name: payload.name,
            location: payload.location,
            server_type: payload.server_type,
            provider: payload.provider,
            ssh_user: payload.ssh_user,
            ssh_port: payload.ssh_port,
            architecture: payload.architecture,
        },
    )
    .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct DeleteVpsRequest {
    pub id: String,
    #[serde(default)]
    pub cascade: bool,
}

async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<DeleteVpsRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = provision::get_host(&kv, &identity.credential, &payload.id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", payload.id)))?;
    let provider = iaas::provider_for(record.provider);
    provision::delete_host(&kv, provider, &state.ssh, &identity.credential, &payload.id, payload.cascade).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct PowerOpRequest {
    pub id: String,
}

async fn power_off(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<PowerOpRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (provider, creds, record) = resolve_power_target(&state, &identity, &payload.id).await?;
    provider.power_off(&creds, &record.id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn power_on(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<PowerOpRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (provider, creds, record) = resolve_power_target(&state, &identity, &payload.id).await?;
    provider.power_on(&creds, &record.id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn reboot(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<PowerOpRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (provider, creds, record) = resolve_power_target(&state, &identity, &payload.id).await?;
    provider.reboot(&creds, &record.id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn resolve_power_target(
    state: &AppState,
    identity: &Identity,
    host_id: &str,
) -> Result<(Arc<dyn iaas::IaasProvider>, String, HostRecord), XanthusError> {
    let kv = state.kv_for(identity);
    let record = provision::get_host(&kv, &identity.credential, host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {host_id}")))?;
    let creds = provider_credential(state, identity, record.provider).await?;
    let provider = iaas::provider_for(record.provider);
    Ok((provider, creds, record))
}

async fn status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<provision::HostStatusResponse>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = provision::get_host(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {id}")))?;
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;
    let response = provision::poll_status(&state.ssh, &record, &shared_key.private_key_pem, &[]).await;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    output: String,
}

async fn logs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<LogsResponse>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = provision::get_host(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {id}")))?;
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;
    let result = state
        .ssh
        .execute(
            &pool_key(&record),
            &shared_key.private_key_pem,
            "journalctl -n 200 --no-pager",
            state.command_deadline,
        )
        .await?;
    Ok(Json(LogsResponse { output: result.stdout }))
}

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub domain: String,
}

async fn configure(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<ConfigureRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let kv = state.kv_for(&identity);
    let mut record = provision::get_host(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {id}")))?;
    let domain_record = crate::dns::get_domain(&kv, &identity.credential, &payload.domain)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("domain {} not enrolled", payload.domain)))?;
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;

    provision::ssl_install::install(
        &state.ssh,
        &pool_key(&record),
        &shared_key.private_key_pem,
        &domain_record.certificate_pem,
        &domain_record.private_key_pem,
    )
    .await?;

    record.ssl_configured = true;
    provision::save_host(&kv, &identity.credential, &record).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct DeployManifestRequest {
    pub manifest: String,
}

async fn deploy_manifest(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<DeployManifestRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = provision::get_host(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {id}")))?;
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;

    let path = format!("/tmp/xanthus-manifest-{id}.yaml");
    let command = format!(
        "cat > {path} <<'EOF'\n{}\nEOF\nkubectl apply -f {path}",
        payload.manifest
    );
    let result = state
        .ssh
        .execute(&pool_key(&record), &shared_key.private_key_pem, &command, state.command_deadline)
        .await?;
    if result.exit_code != 0 {
        return Err(XanthusError::CommandFailure {
            command: "kubectl apply".to_string(),
            exit_code: result.exit_code,
            output: result.stdout,
        }
        .into());
    }
    Ok(Json(serde_json::json!({ "output": result.stdout })))
}

#[derive(Debug, Serialize)]
struct TerminalAllocation {
    uuid: uuid::Uuid,
}

async fn open_terminal(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<TerminalAllocation>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = provision::get_host(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {id}")))?;
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;
    let pending = crate::terminal::PendingTerminal {
        pool_key: pool_key(&record),
        private_key_pem: shared_key.private_key_pem,
    };
    let uuid = state.terminal.allocate(pending);
    Ok(Json(TerminalAllocation { uuid }))
}

#[derive(Debug, Deserialize)]
pub struct SshKeyQuery {
    #[serde(default)]
    pub download: bool,
}

async fn ssh_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SshKeyQuery>,
) -> Result<Response, ServerError> {
    let kv = state.kv_for(&identity);
    let shared_key = vault::ensure_shared_key(&kv, &identity.credential).await?;
    if params.download {
        Ok((
            [
                (header::CONTENT_TYPE, "application/x-pem-file".to_string()),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"xanthus_key.pem\"".to_string()),
            ],
            shared_key.private_key_pem,
        )
            .into_response())
    } else {
        Ok(Json(serde_json::json!({ "private_key_pem": shared_key.private_key_pem })).into_response())
    }
}
