pub mod crypto;
pub mod keys;

pub use crypto::{decrypt, encrypt, mask_credential};

use crate::error::XanthusError;
use crate::kv::KvStore;
use crate::model::SharedKeyMaterial;

const SHARED_KEY_KV_KEY: &str = "config:ssl:csr";

pub fn provider_credential_key(provider: &str) -> String {
    format!("config:{provider}:api_key")
}

/// Envelope-encrypts `value` under `credential` and writes it to the KV.
pub async fn kv_put(
    kv: &KvStore,
    key: &str,
    value: &str,
    credential: &str,
) -> Result<(), XanthusError> {
    let ciphertext = crypto::encrypt(value, credential)?;
    kv.put(key, &ciphertext).await
}

/// Reads and decrypts a value previously written with [`kv_put`].
pub async fn kv_get(
    kv: &KvStore,
    key: &str,
    credential: &str,
) -> Result<String, XanthusError> {
    let ciphertext = kv
        .get(key)
        .await?
        .ok_or_else(|| XanthusError::NotFound(key.to_string()))?;
    crypto::decrypt(&ciphertext, credential)
}

pub async fn kv_get_optional(
    kv: &KvStore,
    key: &str,
    credential: &str,
) -> Result<Option<String>, XanthusError> {
    match kv.get(key).await? {
        Some(ciphertext) => Ok(Some(crypto::decrypt(&ciphertext, credential)?)),
        None => Ok(None),
    }
}

pub async fn kv_delete(kv: &KvStore, key: &str) -> Result<(), XanthusError> {
    kv.delete(key).await
}

pub async fn kv_list(kv: &KvStore, prefix: &str) -> Result<Vec<String>, XanthusError> {
    kv.list(prefix).await
}

/// Returns the shared RSA keypair, generating and persisting it on first
/// use. Concurrent first-logins are resolved by re-reading after a losing
/// write race: content is immaterial once persisted, so last-writer-wins is
/// acceptable (property 2 in the testable-properties list).
pub async fn ensure_shared_key(
    kv: &KvStore,
    credential: &str,
) -> Result<SharedKeyMaterial, XanthusError> {
    if let Some(existing) = kv_get_optional(kv, SHARED_KEY_KV_KEY, credential).await? {
        return serde_json::from_str(&existing)
            .map_err(|_| XanthusError::BadInput("corrupt shared key material".into()));
    }

    let (private_key_pem, csr_pem) = keys::generate_keypair_and_csr()
        .map_err(|_| XanthusError::CryptoFailure)?;
    let material = SharedKeyMaterial {
        private_key_pem,
        csr_pem,
        created_at: chrono::Utc::now(),
    };
    let encoded = serde_json::to_string(&material)
        .map_err(|_| XanthusError::CryptoFailure)?;
    kv_put(kv, SHARED_KEY_KV_KEY, &encoded, credential).await?;

    // Re-read in case a concurrent first-login won the race.
    let stored = kv_get(kv, SHARED_KEY_KV_KEY, credential).await?;
    serde_json::from_str(&stored).map_err(|_| XanthusError::CryptoFailure)
}

pub fn private_key_to_openssh(pem: &str) -> Result<String, XanthusError> {
    keys::private_key_to_openssh(pem).map_err(|_| XanthusError::CryptoFailure)
}
