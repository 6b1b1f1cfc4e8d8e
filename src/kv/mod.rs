//! The single persistence substrate. There is no local database: every
//! durable entity lives as an encrypted blob in the DNS provider's
//! namespaced key-value store, addressed under the key layout in `model.rs`'s
//! callers. This module owns only the plain get/put/delete/list surface;
//! envelope encryption lives in `vault`.

use std::sync::Arc;

use crate::dns::DnsClient;
use crate::error::XanthusError;

/// A resolved handle onto one operator's KV namespace. Built once per
/// authenticated session (the DNS provider token doubles as both API
/// credential and KV auth, matching this system's single-secret model).
#[derive(Clone)]
pub struct KvStore {
    client: Arc<DnsClient>,
    token: String,
    namespace_id: String,
}

impl KvStore {
    pub fn new(client: Arc<DnsClient>, token: String, namespace_id: String) -> Self {
        Self {
            client,
            token,
            namespace_id,
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<(), XanthusError> {
        self.client
            .kv_put(&self.token, &self.namespace_id, key, value)
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, XanthusError> {
        self.client
            .kv_get(&self.token, &self.namespace_id, key)
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<(), XanthusError> {
        self.client
            .kv_delete(&self.token, &self.namespace_id, key)
            .await
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, XanthusError> {
        self.client
            .kv_list(&self.token, &self.namespace_id, prefix)
            .await
    }
}
