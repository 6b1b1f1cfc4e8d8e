//! Pure symmetric-crypto functions: no I/O, unit-testable in isolation.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

use crate::error::XanthusError;

fn derive_key(operator_credential: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(operator_credential.as_bytes());
    hasher.finalize().into()
}

/// `nonce(12) || ciphertext || tag`, base64-encoded.
pub fn encrypt(plaintext: &str, operator_credential: &str) -> Result<String, XanthusError> {
    let key = derive_key(operator_credential);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| XanthusError::CryptoFailure)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| XanthusError::CryptoFailure)?;

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

pub fn decrypt(ciphertext_b64: &str, operator_credential: &str) -> Result<String, XanthusError> {
    let combined = BASE64
        .decode(ciphertext_b64)
        .map_err(|_| XanthusError::BadInput("malformed ciphertext".into()))?;

    if combined.len() < 13 {
        return Err(XanthusError::BadInput("ciphertext too short".into()));
    }

    let (nonce_bytes, ct) = combined.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = derive_key(operator_credential);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| XanthusError::CryptoFailure)?;

    let plaintext_bytes = cipher
        .decrypt(nonce, ct)
        .map_err(|_| XanthusError::BadToken)?;

    String::from_utf8(plaintext_bytes).map_err(|_| XanthusError::BadToken)
}

/// `first4…last4`, used whenever a credential is echoed back to the operator.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return "…".repeat(1);
    }
    let first: String = chars[..4].iter().collect();
    let last: String = chars[chars.len() - 4..].iter().collect();
    format!("{first}…{last}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let ct = encrypt("hello world", "credential-a").unwrap();
        assert_eq!(decrypt(&ct, "credential-a").unwrap(), "hello world");
    }

    #[test]
    fn wrong_credential_fails() {
        let ct = encrypt("hello world", "credential-a").unwrap();
        assert!(matches!(
            decrypt(&ct, "credential-b"),
            Err(XanthusError::BadToken)
        ));
    }

    #[test]
    fn different_nonces() {
        let a = encrypt("same message", "cred").unwrap();
        let b = encrypt("same message", "cred").unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, "cred").unwrap(), "same message");
        assert_eq!(decrypt(&b, "cred").unwrap(), "same message");
    }

    #[test]
    fn too_short_is_malformed() {
        let bad = BASE64.encode(b"short");
        assert!(matches!(decrypt(&bad, "cred"), Err(XanthusError::BadInput(_))));
    }

    #[test]
    fn mask_keeps_ends_only() {
        assert_eq!(mask_credential("abcd1234efgh5678"), "abcd…5678");
    }
}
