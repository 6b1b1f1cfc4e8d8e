use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `config:ssl:csr` — the single RSA keypair backing both TLS origin
/// certificates and SSH client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedKeyMaterial {
    pub private_key_pem: String,
    pub csr_pem: String,
    pub created_at: DateTime<Utc>,
}

/// `vps:<id>:config`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Starting,
    Deleting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IaasProviderKind {
    Hetzner,
    Oci,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    pub name: String,
    pub server_type: String,
    pub location: String,
    pub public_ipv4: String,
    pub status: HostStatus,
    pub created_at: DateTime<Utc>,
    pub ssl_configured: bool,
    pub ssh_key_name: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub hourly_rate: f64,
    pub monthly_rate: f64,
    pub timezone: Option<String>,
    pub provider: IaasProviderKind,
}

/// `domain:<fqdn>:ssl_config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSSLRecord {
    pub fqdn: String,
    pub zone_id: String,
    pub origin_cert_id: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ssl_mode: String,
    pub always_use_https: bool,
    pub page_rule_created: bool,
    pub configured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppDeployStatus {
    Deploying,
    Deployed,
    Failed,
    Upgrading,
    Deleting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortForward {
    pub id: String,
    pub container_port: u16,
    pub subdomain: String,
}

/// `app:<uuid>:config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub app_type: String,
    pub version: String,
    pub host_id: String,
    pub fqdn: String,
    pub subdomain: String,
    pub status: AppDeployStatus,
    pub assigned_port: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub port_forwards: Vec<PortForward>,
    pub encrypted_admin_password: Option<String>,
}
