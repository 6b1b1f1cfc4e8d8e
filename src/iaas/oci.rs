use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::XanthusError;
use crate::model::IaasProviderKind;

use super::{CpuType, IaasProvider, Location, ServerType, Vm, VmSpec};

const BASE_URL: &str = "https://iaas.oci.example/20160918";

/// OCI client shaped identically to [`super::hetzner::HetznerProvider`] —
/// same bearer-token REST surface, different endpoint paths and response
/// envelopes.
pub struct OciProvider {
    http: Client,
}

impl OciProvider {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, XanthusError> {
        let response = builder.send().await.map_err(|e| XanthusError::ProviderUnreachable {
            provider: "oci".into(),
            source: e.into(),
        })?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "oci".into(),
                status: status.as_u16(),
                message: body.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl IaasProvider for OciProvider {
    fn kind(&self) -> IaasProviderKind {
        IaasProviderKind::Oci
    }

    async fn list_locations(&self, creds: &str) -> Result<Vec<Location>, XanthusError> {
        let body = self
            .send(self.http.get(format!("{BASE_URL}/availabilityDomains")).bearer_auth(creds))
            .await?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| {
                let name = l.get("name")?.as_str()?.to_string();
                Some(Location {
                    id: name.clone(),
                    name,
                    description: l.get("description")?.as_str().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn list_server_types(
        &self,
        creds: &str,
        location: &str,
    ) -> Result<Vec<ServerType>, XanthusError> {
        let body = self
            .send(
                self.http
                    .get(format!("{BASE_URL}/shapes"))
                    .bearer_auth(creds)
                    .query(&[("availabilityDomain", location)]),
            )
            .await?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|shape| {
                Some(ServerType {
                    name: shape.get("shape")?.as_str()?.to_string(),
                    hourly_price_net: shape.get("hourlyPrice")?.as_f64()?,
                    hourly_price_gross: shape.get("hourlyPrice")?.as_f64()?,
                    monthly_price_net: shape.get("monthlyPrice")?.as_f64()?,
                    monthly_price_gross: shape.get("monthlyPrice")?.as_f64()?,
                    cpu_cores: shape.get("ocpus")?.as_u64()? as u32,
                    memory_gb: shape.get("memoryInGBs")?.as_f64()?,
                    disk_gb: shape.get("localDiskInGBs").and_then(Value::as_u64).unwrap_or(50) as u32,
                    architecture: shape.get("processorDescription").and_then(Value::as_str).unwrap_or("x86").to_string(),
                    cpu_type: CpuType::Shared,
                    available: true,
                })
            })
            .collect())
    }

    async fn ensure_ssh_key(
        &self,
        _creds: &str,
        public_key_line: &str,
        _label: &str,
    ) -> Result<String, XanthusError> {
        // OCI has no server-side key-pair registry: the public key is
        // injected per-instance via cloud-init metadata instead, so the
        // "key id" here is a content-address the caller stashes on the VM
        // spec rather than a provider-issued identifier.
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Ok(format!("xanthus-key-{now}-{}", sha256_prefix(public_key_line)))
    }

    async fn create_vm(
        &self,
        creds: &str,
        spec: &VmSpec,
        cloud_init_script: &str,
        _ssh_key_id: &str,
    ) -> Result<Vm, XanthusError> {
        let labels: serde_json::Map<String, Value> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let body = self
            .send(
                self.http
                    .post(format!("{BASE_URL}/instances"))
                    .bearer_auth(creds)
                    .json(&json!({
                        "displayName": spec.name,
                        "availabilityDomain": spec.location,
                        "shape": spec.server_type,
                        "sourceDetails": { "imageId": spec.image },
                        "metadata": { "user_data": base64_encode(cloud_init_script) },
                        "freeformTags": labels,
                    })),
            )
            .await?;
        Ok(Vm {
            id: body.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            name: body.get("displayName").and_then(Value::as_str).unwrap_or_default().to_string(),
            public_ipv4: String::new(),
            status: body.get("lifecycleState").and_then(Value::as_str).unwrap_or("unknown").to_string(),
        })
    }

    async fn delete_vm(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(self.http.delete(format!("{BASE_URL}/instances/{id}")).bearer_auth(creds))
            .await?;
        Ok(())
    }

    async fn power_off(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/instances/{id}/actions/stop"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn power_on(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/instances/{id}/actions/start"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn reboot(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/instances/{id}/actions/reset"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn list_vms(&self, creds: &str) -> Result<Vec<Vm>, XanthusError> {
        let body = self
            .send(
                self.http
                    .get(format!("{BASE_URL}/instances"))
                    .bearer_auth(creds)
                    .query(&[("freeformTags.managed_by", "xanthus")]),
            )
            .await?;
        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|instance| {
                Some(Vm {
                    id: instance.get("id")?.as_str()?.to_string(),
                    name: instance.get("displayName")?.as_str()?.to_string(),
                    public_ipv4: String::new(),
                    status: instance.get("lifecycleState")?.as_str().unwrap_or("unknown").to_string(),
                })
            })
            .collect())
    }
}

fn sha256_prefix(data: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(data.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

fn base64_encode(data: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(data.as_bytes())
}
