//! Application catalog & deployer (C7, deploy half): turns a descriptor id
//! plus a target host/domain into a running Helm release, extracts an
//! initial admin credential for the app types that expose one, and manages
//! extra port forwards and in-place upgrades afterward.

pub mod admin_credential;
pub mod port_forward;

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::version::VersionResolver;
use crate::catalog::{render_values, Catalog};
use crate::error::XanthusError;
use crate::helm;
use crate::kv::KvStore;
use crate::model::{ApplicationRecord, AppDeployStatus, HostStatus, PortForward};
use crate::provision;
use crate::ssh::{PoolKey, SshPool};
use crate::vault;
use crate::{dns, model};

const APP_KEY_PREFIX: &str = "app:";
const COMMAND_DEADLINE: Duration = Duration::from_secs(30);

fn app_key(id: &str) -> String {
    format!("{APP_KEY_PREFIX}{id}:config")
}

pub async fn get_app(
    kv: &KvStore,
    credential: &str,
    id: &str,
) -> Result<Option<ApplicationRecord>, XanthusError> {
    match vault::kv_get_optional(kv, &app_key(id), credential).await? {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).map_err(|_| XanthusError::BadInput("corrupt application record".into()))?,
        )),
        None => Ok(None),
    }
}

pub async fn list_apps(kv: &KvStore, credential: &str) -> Result<Vec<ApplicationRecord>, XanthusError> {
    let keys = vault::kv_list(kv, APP_KEY_PREFIX).await?;
    let mut apps = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(raw) = vault::kv_get_optional(kv, &key, credential).await? {
            if let Ok(record) = serde_json::from_str(&raw) {
                apps.push(record);
            }
        }
    }
    Ok(apps)
}

async fn save_app(kv: &KvStore, credential: &str, record: &ApplicationRecord) -> Result<(), XanthusError> {
    let encoded = serde_json::to_string(record)
        .map_err(|_| XanthusError::BadInput("failed to encode application record".into()))?;
    vault::kv_put(kv, &app_key(&record.id), &encoded, credential).await
}

/// `key1=value1,key2=value2` pairs — the convention every descriptor's
/// `values_template` renders to once `{{...}}` tokens are substituted.
fn parse_set_pairs(rendered: &str) -> Vec<(String, String)> {
    rendered
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

pub struct DeployRequest {
    pub app_type: String,
    pub name: String,
    pub subdomain: String,
    pub domain: String,
    pub vps: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

pub struct DeployOutcome {
    pub record: ApplicationRecord,
    pub initial_password: Option<String>,
}

async fn host_pool_key(record: &model::HostRecord) -> PoolKey {
    PoolKey::new(record.public_ipv4.clone(), record.ssh_port, record.ssh_user.clone())
}

/// The full nine-step deploy flow: resolve descriptor, host and domain,
/// ensure the host's SSL material, resolve a version, persist a `deploying`
/// ApplicationRecord, install, and on failure anywhere past the install step
/// roll back to `failed` with a best-effort `helm uninstall`.
pub async fn deploy(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    resolver: &VersionResolver,
    operator_credential: &str,
    req: DeployRequest,
) -> Result<DeployOutcome, XanthusError> {
    let descriptor = catalog
        .get(&req.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", req.app_type)))?
        .clone();

    let mut host = provision::get_host(kv, operator_credential, &req.vps)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", req.vps)))?;
    if host.status != HostStatus::Running {
        return Err(XanthusError::Conflict(format!(
            "host {} is not running (status {:?})",
            req.vps, host.status
        )));
    }

    let domain_record = dns::get_domain(kv, operator_credential, &req.domain)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("domain {} not enrolled", req.domain)))?;

    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    if !host.ssl_configured {
        provision::ssl_install::install(
            ssh,
            &pool_key,
            &shared_key.private_key_pem,
            &domain_record.certificate_pem,
            &domain_record.private_key_pem,
        )
        .await?;
        host.ssl_configured = true;
        provision::save_host(kv, operator_credential, &host).await?;
    }

    let version = match req.version {
        Some(v) => v,
        None => resolver.resolve(&descriptor.version_source).await?,
    };

    let app_id = Uuid::new_v4().to_string();
    let fqdn = format!("{}.{}", req.subdomain, req.domain);
    let mut record = ApplicationRecord {
        id: app_id.clone(),
        name: req.name,
        description: req.description,
        app_type: req.app_type.clone(),
        version: version.clone(),
        host_id: req.vps.clone(),
        fqdn,
        subdomain: req.subdomain.clone(),
        status: AppDeployStatus::Deploying,
        assigned_port: None,
        created_at: Utc::now(),
        port_forwards: Vec::new(),
        encrypted_admin_password: None,
    };
    save_app(kv, operator_credential, &record).await?;

    let namespace = &descriptor.helm_chart.namespace;
    let values = render_values(
        &descriptor.helm_chart.values_template,
        &descriptor.helm_chart.placeholders,
        &version,
        &req.domain,
        &req.subdomain,
        &std::collections::HashMap::new(),
    );
    let set_pairs = parse_set_pairs(&values);

    let install_cmd = helm::install(
        &record.name,
        &descriptor.helm_chart.chart,
        &version,
        namespace,
        &set_pairs,
    );

    let outcome = install_and_extract(ssh, &pool_key, &shared_key.private_key_pem, &install_cmd, &descriptor, namespace, operator_credential).await;

    match outcome {
        Ok((port, encrypted_password, plaintext_password)) => {
            record.status = AppDeployStatus::Deployed;
            record.assigned_port = Some(port);
            record.encrypted_admin_password = encrypted_password;
            save_app(kv, operator_credential, &record).await?;
            info!(app_id = %record.id, app_type = %req.app_type, "application deployed");
            Ok(DeployOutcome {
                record,
                initial_password: plaintext_password,
            })
        }
        Err(e) => {
            warn!(app_id = %record.id, error = ?e, "deploy failed, uninstalling");
            record.status = AppDeployStatus::Failed;
            save_app(kv, operator_credential, &record).await?;
            let uninstall_cmd = helm::uninstall(&record.name, namespace);
            let _ = ssh.execute(&pool_key, &shared_key.private_key_pem, &uninstall_cmd, COMMAND_DEADLINE).await;
            Err(e)
        }
    }
}

async fn install_and_extract(
    ssh: &SshPool,
    pool_key: &PoolKey,
    private_key_pem: &str,
    install_cmd: &str,
    descriptor: &crate::catalog::CatalogDescriptor,
    namespace: &str,
    operator_credential: &str,
) -> Result<(u16, Option<String>, Option<String>), XanthusError> {
    let result = ssh.execute(pool_key, private_key_pem, install_cmd, COMMAND_DEADLINE).await?;
    if result.exit_code != 0 {
        return Err(XanthusError::CommandFailure {
            command: install_cmd.to_string(),
            exit_code: result.exit_code,
            output: result.stdout,
        });
    }

    let mut encrypted = None;
    let mut plaintext = None;
    if let Some(cmd) = admin_credential::extraction_command(&descriptor.id, namespace) {
        if let Ok(result) = ssh.execute(pool_key, private_key_pem, &cmd, COMMAND_DEADLINE).await {
            let password = result.stdout.trim().to_string();
            if !password.is_empty() {
                encrypted = Some(vault::encrypt(&password, operator_credential)?);
                plaintext = Some(password);
            }
        }
    }

    Ok((descriptor.default_port, encrypted, plaintext))
}

/// In-place Helm upgrade to `new_version`. Status is `upgrading` for the
/// duration; any resolved version, including an older one, is accepted.
pub async fn change_version(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    operator_credential: &str,
    app_id: &str,
    new_version: String,
) -> Result<ApplicationRecord, XanthusError> {
    let mut record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    let descriptor = catalog
        .get(&record.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", record.app_type)))?
        .clone();
    let host = provision::get_host(kv, operator_credential, &record.host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", record.host_id)))?;
    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    record.status = AppDeployStatus::Upgrading;
    save_app(kv, operator_credential, &record).await?;

    let domain = record
        .fqdn
        .strip_prefix(&format!("{}.", record.subdomain))
        .unwrap_or(&record.fqdn);
    let values = render_values(
        &descriptor.helm_chart.values_template,
        &descriptor.helm_chart.placeholders,
        &new_version,
        domain,
        &record.subdomain,
        &std::collections::HashMap::new(),
    );
    let set_pairs = parse_set_pairs(&values);
    let upgrade_cmd = helm::upgrade(
        &record.name,
        &descriptor.helm_chart.chart,
        &new_version,
        &descriptor.helm_chart.namespace,
        &set_pairs,
    );

    let result = ssh
        .execute(&pool_key, &shared_key.private_key_pem, &upgrade_cmd, COMMAND_DEADLINE)
        .await;
    match result {
        Ok(r) if r.exit_code == 0 => {
            record.version = new_version;
            record.status = AppDeployStatus::Deployed;
            save_app(kv, operator_credential, &record).await?;
            Ok(record)
        }
        Ok(r) => {
            record.status = AppDeployStatus::Failed;
            save_app(kv, operator_credential, &record).await?;
            Err(XanthusError::CommandFailure {
                command: upgrade_cmd,
                exit_code: r.exit_code,
                output: r.stdout,
            })
        }
        Err(e) => {
            record.status = AppDeployStatus::Failed;
            save_app(kv, operator_credential, &record).await?;
            Err(e)
        }
    }
}

/// Uninstalls the Helm release and removes the ApplicationRecord.
pub async fn uninstall(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    operator_credential: &str,
    app_id: &str,
) -> Result<(), XanthusError> {
    let record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    let descriptor = catalog
        .get(&record.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", record.app_type)))?;
    let host = provision::get_host(kv, operator_credential, &record.host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", record.host_id)))?;
    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    let uninstall_cmd = helm::uninstall(&record.name, &descriptor.helm_chart.namespace);
    ssh.execute(&pool_key, &shared_key.private_key_pem, &uninstall_cmd, COMMAND_DEADLINE)
        .await?;
    vault::kv_delete(kv, &app_key(app_id)).await?;
    info!(app_id, "application uninstalled");
    Ok(())
}

pub async fn get_password(
    kv: &KvStore,
    operator_credential: &str,
    app_id: &str,
) -> Result<Option<String>, XanthusError> {
    let record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    match record.encrypted_admin_password {
        Some(ct) => Ok(Some(vault::crypto::decrypt(&ct, operator_credential)?)),
        None => Ok(None),
    }
}

/// Re-runs the extraction command and persists the fresh value; used when
/// the descriptor type re-generates a password on each read (code-server's
/// config file is stable, so for that type this just re-reads it).
pub async fn rotate_password(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    operator_credential: &str,
    app_id: &str,
) -> Result<Option<String>, XanthusError> {
    let mut record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    let descriptor = catalog
        .get(&record.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", record.app_type)))?;
    let host = provision::get_host(kv, operator_credential, &record.host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", record.host_id)))?;
    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    let Some(cmd) = admin_credential::extraction_command(&descriptor.id, &descriptor.helm_chart.namespace) else {
        return Ok(None);
    };
    let result = ssh.execute(&pool_key, &shared_key.private_key_pem, &cmd, COMMAND_DEADLINE).await?;
    let password = result.stdout.trim().to_string();
    if password.is_empty() {
        return Ok(None);
    }
    record.encrypted_admin_password = Some(vault::encrypt(&password, operator_credential)?);
    save_app(kv, operator_credential, &record).await?;
    Ok(Some(password))
}

/// Materialises a Service+Ingress for one extra port and persists the
/// forward on the ApplicationRecord.
pub async fn add_port_forward(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    operator_credential: &str,
    app_id: &str,
    container_port: u16,
    subdomain: String,
) -> Result<PortForward, XanthusError> {
    let mut record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    let descriptor = catalog
        .get(&record.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", record.app_type)))?;
    let host = provision::get_host(kv, operator_credential, &record.host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", record.host_id)))?;
    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    let forward = PortForward {
        id: Uuid::new_v4().to_string(),
        container_port,
        subdomain,
    };

    let domain = record.fqdn.splitn(2, '.').nth(1).unwrap_or(&record.fqdn).to_string();
    let command = port_forward::apply_command(
        app_id,
        &descriptor.helm_chart.namespace,
        &record.name,
        &domain,
        &forward,
    )
    .map_err(XanthusError::BadInput)?;
    ssh.execute(&pool_key, &shared_key.private_key_pem, &command, COMMAND_DEADLINE)
        .await?;

    record.port_forwards.push(forward.clone());
    save_app(kv, operator_credential, &record).await?;
    Ok(forward)
}

pub async fn remove_port_forward(
    kv: &KvStore,
    ssh: &SshPool,
    catalog: &Catalog,
    operator_credential: &str,
    app_id: &str,
    forward_id: &str,
) -> Result<(), XanthusError> {
    let mut record = get_app(kv, operator_credential, app_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("application {app_id}")))?;
    let descriptor = catalog
        .get(&record.app_type)
        .ok_or_else(|| XanthusError::NotFound(format!("catalog entry `{}`", record.app_type)))?;
    let host = provision::get_host(kv, operator_credential, &record.host_id)
        .await?
        .ok_or_else(|| XanthusError::NotFound(format!("host {}", record.host_id)))?;
    let shared_key = vault::ensure_shared_key(kv, operator_credential).await?;
    let pool_key = host_pool_key(&host).await;

    let command = port_forward::delete_command(app_id, &descriptor.helm_chart.namespace, forward_id);
    ssh.execute(&pool_key, &shared_key.private_key_pem, &command, COMMAND_DEADLINE)
        .await?;

    record.port_forwards.retain(|f| f.id != forward_id);
    save_app(kv, operator_credential, &record).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_set_pairs() {
        let pairs = parse_set_pairs("image.tag=1.2.3,ingress.host=ide.example.com");
        assert_eq!(
            pairs,
            vec![
                ("image.tag".to_string(), "1.2.3".to_string()),
                ("ingress.host".to_string(), "ide.example.com".to_string()),
            ]
        );
    }

    #[test]
    fn ignores_malformed_pairs_without_equals() {
        let pairs = parse_set_pairs("justakey,real=value");
        assert_eq!(pairs, vec![("real".to_string(), "value".to_string())]);
    }
}
