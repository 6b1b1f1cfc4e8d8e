//! Provisioning orchestrator (C5): turns a create-host request into a VM at
//! an IaaS provider running a self-installing k3s/Helm/ArgoCD stack, and
//! answers status polls and teardown requests for it.

pub mod cost;
pub mod script;
pub mod ssl_install;
pub mod state_machine;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::info;

use crate::error::XanthusError;
use crate::iaas::{IaasProvider, VmSpec};
use crate::kv::KvStore;
use crate::model::{HostRecord, HostStatus, IaasProviderKind};
use crate::ssh::{HostHealth, PoolKey, SshPool};
use crate::vault;

const HOST_KEY_PREFIX: &str = "vps:";
const APP_KEY_PREFIX: &str = "app:";
const STATUS_PROBE_DEADLINE: Duration = Duration::from_secs(10);

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{3,63}$").unwrap())
}

/// `^[A-Za-z0-9-]{3,63}$`, plus the no-leading/trailing-hyphen rule the
/// bare regex can't express without lookaround.
pub fn validate_name(name: &str) -> Result<(), XanthusError> {
    if !name_pattern().is_match(name) {
        return Err(XanthusError::BadInput(
            "host name must be 3-63 characters of letters, digits, and hyphens".into(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(XanthusError::BadInput(
            "host name must not start or end with a hyphen".into(),
        ));
    }
    Ok(())
}

pub(crate) fn host_key(id: &str) -> String {
    format!("{HOST_KEY_PREFIX}{id}:config")
}

/// Persists a HostRecord that already exists (e.g. after flipping
/// `ssl_configured`), as opposed to [`create_host`] which allocates a new
/// one.
pub async fn save_host(kv: &KvStore, credential: &str, record: &HostRecord) -> Result<(), XanthusError> {
    let encoded = serde_json::to_string(record)
        .map_err(|_| XanthusError::BadInput("failed to encode host record".into()))?;
    vault::kv_put(kv, &host_key(&record.id), &encoded, credential).await
}

pub async fn get_host(
    kv: &KvStore,
    credential: &str,
    id: &str,
) -> Result<Option<HostRecord>, XanthusError> {
    match vault::kv_get_optional(kv, &host_key(id), credential).await? {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw)
                .map_err(|_| XanthusError::BadInput("corrupt host record".into()))?,
        )),
        None => Ok(None),
    }
}

pub async fn list_hosts(kv: &KvStore, credential: &str) -> Result<Vec<HostRecord>, XanthusError> {
    let keys = vault::kv_list(kv, HOST_KEY_PREFIX).await?;
    let mut hosts = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(raw) = vault::kv_get_optional(kv, &key, credential).await? {
            if let Ok(record) = serde_json::from_str(&raw) {
                hosts.push(record);
            }
        }
    }
    Ok(hosts)
}

async fn name_collides(kv: &KvStore, credential: &str, name: &str) -> Result<bool, XanthusError> {
    Ok(list_hosts(kv, credential)
        .await?
        .iter()
        .any(|h| h.name == name))
}

pub struct CreateHostRequest {
    pub name: String,
    pub location: String,
    pub server_type: String,
    pub provider: IaasProviderKind,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub architecture: String,
}

/// Steps 1-7 of host creation: validate, fetch provider creds, ensure the
/// shared key, upload it to the provider, compose the first-boot script,
/// create the VM, and persist the resulting HostRecord.
pub async fn create_host(
    kv: &KvStore,
    iaas: Arc<dyn IaasProvider>,
    operator_credential: &str,
    req: CreateHostRequest,
) -> Result<HostRecord, XanthusError> {
    validate_name(&req.name)?;
    if name_collides(kv, operator_credential, &req.name).await? {
        return Err(XanthusError::Conflict(format!(
            "a host named `{}` already exists",
            req.name
        )));
    }

    let provider_name = provider_name(req.provider);
    let provider_creds = vault::kv_get_optional(
        kv,
        &vault::provider_credential_key(provider_name),
        operator_credential,
    )
    .await?
    .ok_or_else(|| XanthusError::NotFound(format!("{provider_name} credential")))?;

    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let ssh_public_key = vault::private_key_to_openssh(&shared_key.private_key_pem)?;

    let ssh_key_id = iaas
        .ensure_ssh_key(&provider_creds, &ssh_public_key, &format!("xanthus-{}", req.name))
        .await?;

    let boot_script = script::render(&req.ssh_user, &ssh_public_key, &req.architecture);
    let spec = VmSpec::new(req.name.clone(), req.location.clone(), req.server_type.clone());
    let vm = iaas
        .create_vm(&provider_creds, &spec, &boot_script, &ssh_key_id)
        .await?;

    if name_collides(kv, operator_credential, &req.name).await? {
        iaas.delete_vm(&provider_creds, &vm.id).await?;
        return Err(XanthusError::Conflict(format!(
            "a host named `{}` already exists",
            req.name
        )));
    }

    let server_types = iaas.list_server_types(&provider_creds, &req.location).await?;
    let rates = server_types
        .iter()
        .find(|t| t.name == req.server_type)
        .map(|t| (t.hourly_price_net, t.monthly_price_net))
        .unwrap_or((0.0, 0.0));

    let record = HostRecord {
        id: vm.id.clone(),
        name: req.name,
        server_type: req.server_type,
        location: req.location,
        public_ipv4: vm.public_ipv4,
        status: HostStatus::Initializing,
        created_at: Utc::now(),
        ssl_configured: false,
        ssh_key_name: ssh_key_id,
        ssh_user: req.ssh_user,
        ssh_port: req.ssh_port,
        hourly_rate: rates.0,
        monthly_rate: rates.1,
        timezone: None,
        provider: req.provider,
    };

    let encoded = serde_json::to_string(&record)
        .map_err(|_| XanthusError::BadInput("failed to encode host record".into()))?;
    vault::kv_put(kv, &host_key(&record.id), &encoded, operator_credential).await?;
    info!(host_id = %record.id, name = %record.name, "host provisioning started");
    Ok(record)
}

pub fn provider_name(kind: IaasProviderKind) -> &'static str {
    match kind {
        IaasProviderKind::Hetzner => "hetzner",
        IaasProviderKind::Oci => "oci",
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HostStatusResponse {
    pub setup_status: String,
    pub setup_message: String,
    pub reachable: bool,
    pub k3s_status: String,
    pub system_load: String,
    pub disk: Option<crate::ssh::DiskUsage>,
    pub services: Vec<(String, String)>,
    pub last_checked: chrono::DateTime<Utc>,
}

/// Polls `HostHealth` over SSH and maps the sentinel to its user sentence.
pub async fn poll_status(
    ssh: &SshPool,
    record: &HostRecord,
    private_key_pem: &str,
    extra_services: &[String],
) -> HostStatusResponse {
    let key = PoolKey::new(record.public_ipv4.clone(), record.ssh_port, record.ssh_user.clone());
    let health: HostHealth = ssh
        .health_probe(&key, private_key_pem, STATUS_PROBE_DEADLINE, extra_services)
        .await;
    HostStatusResponse {
        setup_message: state_machine::setup_message(&health.setup_status),
        setup_status: health.setup_status,
        reachable: health.reachable,
        k3s_status: health.k3s_status,
        system_load: health.uptime,
        disk: health.disk,
        services: health.services,
        last_checked: Utc::now(),
    }
}

/// Returns the ids of ApplicationRecords still referencing `host_id`, read
/// directly off the KV rather than through the catalog/deployer module so
/// host deletion doesn't have to depend on it.
pub async fn app_ids_referencing_host(
    kv: &KvStore,
    credential: &str,
    host_id: &str,
) -> Result<Vec<String>, XanthusError> {
    let keys = vault::kv_list(kv, APP_KEY_PREFIX).await?;
    let mut ids = Vec::new();
    for key in keys {
        if let Some(raw) = vault::kv_get_optional(kv, &key, credential).await? {
            if let Ok(app) = serde_json::from_str::<crate::model::ApplicationRecord>(&raw) {
                if app.host_id == host_id {
                    ids.push(app.id);
                }
            }
        }
    }
    Ok(ids)
}

/// Deletes a host. Refuses if ApplicationRecords still reference it unless
/// `cascade` is set, in which case the caller is expected to have already
/// uninstalled and removed them (normally via the application deployer) —
/// this is the last-resort cleanup of any KV entries left behind.
pub async fn delete_host(
    kv: &KvStore,
    iaas: Arc<dyn IaasProvider>,
    ssh: &SshPool,
    operator_credential: &str,
    host_id: &str,
    cascade: bool,
) -> Result<(), XanthusError> {
    let record = get_host(kv, operator_credential, host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {host_id}")))?;

    let referencing = app_ids_referencing_host(kv, operator_credential, host_id).await?;
    if !referencing.is_empty() {
        if !cascade {
            return Err(XanthusError::Conflict(format!(
                "{} application(s) still target this host",
                referencing.len()
            )));
        }
        for app_id in &referencing {
            vault::kv_delete(kv, &format!("{APP_KEY_PREFIX}{app_id}:config")).await?;
        }
    }

    let provider_name = provider_name(record.provider);
    let provider_creds = vault::kv_get_optional(
        kv,
        &vault::provider_credential_key(provider_name),
        operator_credential,
    )
    .await?
    .ok_or_else(|| XanthusError::NotFound(format!("{provider_name} credential")))?;

    iaas.delete_vm(&provider_creds, &record.id).await?;
    vault::kv_delete(kv, &host_key(&record.id)).await?;
    ssh.evict(&PoolKey::new(record.public_ipv4, record.ssh_port, record.ssh_user))
        .await;
    info!(host_id = %host_id, "host deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_name("xanthus-k3s-1").is_ok());
        assert!(validate_name("abc").is_ok());
    }

    #[test]
    fn rejects_too_short_or_long() {
        assert!(validate_name("ab").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn rejects_leading_or_trailing_hyphen() {
        assert!(validate_name("-abc").is_err());
        assert!(validate_name("abc-").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_name("abc_def").is_err());
        assert!(validate_name("abc.def").is_err());
    }
}
