pub mod hetzner;
pub mod oci;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::XanthusError;
use crate::model::IaasProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CpuType {
    Shared,
    Dedicated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerType {
    pub name: String,
    pub hourly_price_net: f64,
    pub hourly_price_gross: f64,
    pub monthly_price_net: f64,
    pub monthly_price_gross: f64,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub disk_gb: u32,
    pub architecture: String,
    pub cpu_type: CpuType,
    pub available: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ServerTypeSortKey {
    Price,
    Cpu,
    Memory,
}

/// Stable sort over a server-type catalog. Ties break on name,
/// lexicographically.
pub fn sort_server_types(types: &mut [ServerType], key: ServerTypeSortKey, descending: bool) {
    types.sort_by(|a, b| {
        let primary = match key {
            ServerTypeSortKey::Price => a.hourly_price_net.partial_cmp(&b.hourly_price_net),
            ServerTypeSortKey::Cpu => a.cpu_cores.partial_cmp(&b.cpu_cores),
            ServerTypeSortKey::Memory => a.memory_gb.partial_cmp(&b.memory_gb),
        }
        .unwrap_or(std::cmp::Ordering::Equal);
        let primary = if descending { primary.reverse() } else { primary };
        primary.then_with(|| a.name.cmp(&b.name))
    });
}

#[derive(Debug, Clone)]
pub struct VmSpec {
    pub name: String,
    pub location: String,
    pub server_type: String,
    pub image: String,
    pub labels: Vec<(String, String)>,
    pub start_after_create: bool,
}

impl VmSpec {
    pub fn new(name: String, location: String, server_type: String) -> Self {
        Self {
            name,
            location,
            server_type,
            image: "ubuntu-24.04".to_string(),
            labels: vec![
                ("managed_by".to_string(), "xanthus".to_string()),
                ("purpose".to_string(), "k3s-cluster".to_string()),
            ],
            start_after_create: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: String,
    pub name: String,
    pub public_ipv4: String,
    pub status: String,
}

/// One interface behind both Hetzner and OCI.
#[async_trait]
pub trait IaasProvider: Send + Sync {
    fn kind(&self) -> IaasProviderKind;
    async fn list_locations(&self, creds: &str) -> Result<Vec<Location>, XanthusError>;
    async fn list_server_types(
        &self,
        creds: &str,
        location: &str,
    ) -> Result<Vec<ServerType>, XanthusError>;
    async fn ensure_ssh_key(
        &self,
        creds: &str,
        public_key_line: &str,
        label: &str,
    ) -> Result<String, XanthusError>;
    async fn create_vm(
        &self,
        creds: &str,
        spec: &VmSpec,
        cloud_init_script: &str,
        ssh_key_id: &str,
    ) -> Result<Vm, XanthusError>;
    async fn delete_vm(&self, creds: &str, id: &str) -> Result<(), XanthusError>;
    async fn power_off(&self, creds: &str, id: &str) -> Result<(), XanthusError>;
    async fn power_on(&self, creds: &str, id: &str) -> Result<(), XanthusError>;
    async fn reboot(&self, creds: &str, id: &str) -> Result<(), XanthusError>;
    async fn list_vms(&self, creds: &str) -> Result<Vec<Vm>, XanthusError>;
}

pub fn provider_for(kind: IaasProviderKind) -> Arc<dyn IaasProvider> {
    match kind {
        IaasProviderKind::Hetzner => Arc::new(hetzner::HetznerProvider::new()),
        IaasProviderKind::Oci => Arc::new(oci::OciProvider::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str, price: f64, cpu: u32, mem: f64) -> ServerType {
        ServerType {
            name: name.to_string(),
            hourly_price_net: price,
            hourly_price_gross: price,
            monthly_price_net: price * 700.0,
            monthly_price_gross: price * 700.0,
            cpu_cores: cpu,
            memory_gb: mem,
            disk_gb: 40,
            architecture: "x86".to_string(),
            cpu_type: CpuType::Shared,
            available: true,
        }
    }

    #[test]
    fn sort_is_stable_with_name_tiebreak() {
        let mut types = vec![t("cx21", 0.01, 2, 4.0), t("cx11", 0.01, 1, 2.0)];
        sort_server_types(&mut types, ServerTypeSortKey::Price, false);
        assert_eq!(types[0].name, "cx11");
        assert_eq!(types[1].name, "cx21");
    }

    #[test]
    fn sort_descending_reverses_primary_key_only() {
        let mut types = vec![t("cx11", 0.01, 1, 2.0), t("cx21", 0.02, 2, 4.0)];
        sort_server_types(&mut types, ServerTypeSortKey::Price, true);
        assert_eq!(types[0].name, "cx21");
    }
}
