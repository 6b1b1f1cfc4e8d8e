use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::XanthusError;
use crate::model::IaasProviderKind;

use super::{CpuType, IaasProvider, Location, ServerType, Vm, VmSpec};

const BASE_URL: &str = "https://api.hetzner.cloud/v1";

pub struct HetznerProvider {
    http: Client,
}

impl HetznerProvider {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, XanthusError> {
        let response = builder.send().await.map_err(|e| XanthusError::ProviderUnreachable {
            provider: "hetzner".into(),
            source: e.into(),
        })?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(XanthusError::ProviderError {
                provider: "hetzner".into(),
                status: status.as_u16(),
                message: body
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl IaasProvider for HetznerProvider {
    fn kind(&self) -> IaasProviderKind {
        IaasProviderKind::Hetzner
    }

    async fn list_locations(&self, creds: &str) -> Result<Vec<Location>, XanthusError> {
        let body = self
            .send(self.http.get(format!("{BASE_URL}/locations")).bearer_auth(creds))
            .await?;
        Ok(body
            .get("locations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| {
                Some(Location {
                    id: l.get("name")?.as_str()?.to_string(),
                    name: l.get("name")?.as_str()?.to_string(),
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
            .send(self.http.get(format!("{BASE_URL}/server_types")).bearer_auth(creds))
            .await?;
        let types = body.get("server_types").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(types
            .into_iter()
            .filter_map(|st| {
                let prices = st.get("prices")?.as_array()?;
                let price = prices
                    .iter()
                    .find(|p| p.get("location").and_then(Value::as_str) == Some(location))?;
                let hourly_net: f64 = price
                    .get("price_hourly")?
                    .get("net")?
                    .as_str()?
                    .parse()
                    .ok()?;
                let hourly_gross: f64 = price
                    .get("price_hourly")?
                    .get("gross")?
                    .as_str()?
                    .parse()
                    .ok()?;
                let monthly_net: f64 = price
                    .get("price_monthly")?
                    .get("net")?
                    .as_str()?
                    .parse()
                    .ok()?;
                let monthly_gross: f64 = price
                    .get("price_monthly")?
                    .get("gross")?
                    .as_str()?
                    .parse()
                    .ok()?;
                Some(ServerType {
                    name: st.get("name")?.as_str()?.to_string(),
                    hourly_price_net: hourly_net,
                    hourly_price_gross: hourly_gross,
                    monthly_price_net: monthly_net,
                    monthly_price_gross: monthly_gross,
                    cpu_cores: st.get("cores")?.as_u64()? as u32,
                    memory_gb: st.get("memory")?.as_f64()?,
                    disk_gb: st.get("disk")?.as_u64()? as u32,
                    architecture: st.get("architecture")?.as_str().unwrap_or("x86").to_string(),
                    cpu_type: if st.get("cpu_type")?.as_str()? == "dedicated" {
                        CpuType::Dedicated
                    } else {
                        CpuType::Shared
                    },
                    available: true,
                })
            })
            .collect())
    }

    async fn ensure_ssh_key(
        &self,
        creds: &str,
        public_key_line: &str,
        _label: &str,
    ) -> Result<String, XanthusError> {
        let body = self
            .send(self.http.get(format!("{BASE_URL}/ssh_keys")).bearer_auth(creds))
            .await?;
        let existing = body.get("ssh_keys").and_then(Value::as_array).cloned().unwrap_or_default();
        if let Some(key) = existing
            .iter()
            .find(|k| k.get("public_key").and_then(Value::as_str) == Some(public_key_line))
        {
            if let Some(id) = key.get("id").and_then(Value::as_u64) {
                return Ok(id.to_string());
            }
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let body = self
            .send(
                self.http
                    .post(format!("{BASE_URL}/ssh_keys"))
                    .bearer_auth(creds)
                    .json(&json!({
                        "name": format!("xanthus-key-{now}"),
                        "public_key": public_key_line,
                    })),
            )
            .await?;
        body.get("ssh_key")
            .and_then(|k| k.get("id"))
            .and_then(Value::as_u64)
            .map(|id| id.to_string())
            .ok_or(XanthusError::ProviderError {
                provider: "hetzner".into(),
                status: 500,
                message: "ssh key create response missing id".into(),
            })
    }

    async fn create_vm(
        &self,
        creds: &str,
        spec: &VmSpec,
        cloud_init_script: &str,
        ssh_key_id: &str,
    ) -> Result<Vm, XanthusError> {
        let labels: serde_json::Map<String, Value> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let body = self
            .send(
                self.http
                    .post(format!("{BASE_URL}/servers"))
                    .bearer_auth(creds)
                    .json(&json!({
                        "name": spec.name,
                        "location": spec.location,
                        "server_type": spec.server_type,
                        "image": spec.image,
                        "ssh_keys": [ssh_key_id],
                        "user_data": cloud_init_script,
                        "labels": labels,
                        "start_after_create": spec.start_after_create,
                    })),
            )
            .await?;
        let server = body.get("server").ok_or(XanthusError::ProviderError {
            provider: "hetzner".into(),
            status: 500,
            message: "create response missing server".into(),
        })?;
        Ok(Vm {
            id: server.get("id").and_then(Value::as_u64).unwrap_or_default().to_string(),
            name: server.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            public_ipv4: server
                .get("public_net")
                .and_then(|n| n.get("ipv4"))
                .and_then(|i| i.get("ip"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: server.get("status").and_then(Value::as_str).unwrap_or("unknown").to_string(),
        })
    }

    async fn delete_vm(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(self.http.delete(format!("{BASE_URL}/servers/{id}")).bearer_auth(creds))
            .await?;
        Ok(())
    }

    async fn power_off(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/servers/{id}/actions/poweroff"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn power_on(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/servers/{id}/actions/poweron"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn reboot(&self, creds: &str, id: &str) -> Result<(), XanthusError> {
        self.send(
            self.http
                .post(format!("{BASE_URL}/servers/{id}/actions/reboot"))
                .bearer_auth(creds),
        )
        .await?;
        Ok(())
    }

    async fn list_vms(&self, creds: &str) -> Result<Vec<Vm>, XanthusError> {
        let body = self
            .send(
                self.http
                    .get(format!("{BASE_URL}/servers"))
                    .bearer_auth(creds)
                    .query(&[("label_selector", "managed_by=xanthus")]),
            )
            .await?;
        Ok(body
            .get("servers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|server| {
                Some(Vm {
                    id: server.get("id")?.as_u64()?.to_string(),
                    name: server.get("name")?.as_str()?.to_string(),
                    public_ipv4: server
                        .get("public_net")?
                        .get("ipv4")?
                        .get("ip")?
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    status: server.get("status")?.as_str().unwrap_or("unknown").to_string(),
                })
            })
            .collect())
    }
}
