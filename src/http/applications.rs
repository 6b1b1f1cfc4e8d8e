//! `/applications/*`: thin wrappers over `appdeploy`, following the same
//! shape as `vps.rs` and `dns.rs`.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::appdeploy::{self, DeployRequest};
use crate::auth::Identity;
use crate::error::{ServerError, XanthusError};
use crate::model::{ApplicationRecord, PortForward};

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/applications/list", get(list))
        .route("/applications/create", post(create))
        .route("/applications/{id}/upgrade", post(upgrade))
        .route("/applications/{id}", delete(uninstall))
        .route("/applications/{id}/password", get(get_password).post(rotate_password))
        .route(
            "/applications/{id}/port-forwards",
            get(list_port_forwards).post(add_port_forward),
        )
        .route("/applications/{id}/port-forwards/{pfid}", delete(remove_port_forward))
}

async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ApplicationRecord>>, ServerError> {
    let kv = state.kv_for(&identity);
    let apps = appdeploy::list_apps(&kv, &identity.credential).await?;
    Ok(Json(apps))
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub app_type: String,
    pub name: String,
    pub subdomain: String,
    pub domain: String,
    pub vps: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateApplicationResponse {
    #[serde(flatten)]
    record: ApplicationRecord,
    initial_password: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Result<Json<CreateApplicationResponse>, ServerError> {
    let kv = state.kv_for(&identity);
    let outcome = appdeploy::deploy(
        &kv,
        &state.ssh,
        &state.catalog,
        &state.resolver,
        &identity.credential,
        DeployRequest {
            app_type: payload.app_type,
            name: payload.name,
            subdomain: payload.subdomain,
            domain: payload.domain,
            vps: payload.vps,
            version: payload.version,
            description: payload.description,
        },
    )
    .await?;
    Ok(Json(CreateApplicationResponse {
        record: outcome.record,
        initial_password: outcome.initial_password,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeApplicationRequest {
    pub version: String,
}

async fn upgrade(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<UpgradeApplicationRequest>,
) -> Result<Json<ApplicationRecord>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = appdeploy::change_version(&kv, &state.ssh, &state.catalog, &identity.credential, &id, payload.version).await?;
    Ok(Json(record))
}

async fn uninstall(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let kv = state.kv_for(&identity);
    appdeploy::uninstall(&kv, &state.ssh, &state.catalog, &identity.credential, &id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Serialize)]
struct PasswordResponse {
    password: Option<String>,
}

async fn get_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<PasswordResponse>, ServerError> {
    let kv = state.kv_for(&identity);
    let password = appdeploy::get_password(&kv, &identity.credential, &id).await?;
    Ok(Json(PasswordResponse { password }))
}

async fn rotate_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<PasswordResponse>, ServerError> {
    let kv = state.kv_for(&identity);
    let password = appdeploy::rotate_password(&kv, &state.ssh, &state.catalog, &identity.credential, &id).await?;
    Ok(Json(PasswordResponse { password }))
}

async fn list_port_forwards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PortForward>>, ServerError> {
    let kv = state.kv_for(&identity);
    let record = appdeploy::get_app(&kv, &identity.credential, &id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {id}")))?;
    Ok(Json(record.port_forwards))
}

#[derive(Debug, Deserialize)]
pub struct AddPortForwardRequest {
    pub container_port: u16,
    pub subdomain: String,
}

async fn add_port_forward(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<AddPortForwardRequest>,
) -> Result<Json<PortForward>, ServerError> {
    let kv = state.kv_for(&identity);
    let forward = appdeploy::add_port_forward(
        &kv,
        &state.ssh,
        &state.catalog,
        &identity.credential,
        &id,
        payload.container_port,
        payload.subdomain,
    )
    .await?;
    Ok(Json(forward))
}

async fn remove_port_forward(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, pfid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let kv = state.kv_for(&identity);
    appdeploy::remove_port_forward(&kv, &state.ssh, &state.catalog, &identity.credential, &id, &pfid).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
