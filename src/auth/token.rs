//! Signed access/refresh token pair for API and web-socket clients. HS256
//! with a process-random secret, signing the verified operator identity.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const ACCESS_TOKEN_SECONDS: u64 = 15 * 60;
const REFRESH_TOKEN_SECONDS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user_id: String,
    pub account_id: String,
    pub namespace_id: String,
    pub cf_token: String,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug)]
pub enum TokenError {
    Invalid,
    Expired,
}

/// Signs and verifies tokens with an HMAC secret generated once at process
/// start. It is never persisted: a restart invalidates every outstanding
/// token, which is acceptable since this is a single-operator deployment.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
        }
    }

    pub fn issue(&self, user_id: &str, account_id: &str, namespace_id: &str, cf_token: &str) -> Result<TokenPair, TokenError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TokenError::Invalid)?
            .as_secs();

        let base = Claims {
            user_id: user_id.to_string(),
            account_id: account_id.to_string(),
            namespace_id: namespace_id.to_string(),
            cf_token: cf_token.to_string(),
            kind: TokenKind::Access,
            iat: now,
            exp: now + ACCESS_TOKEN_SECONDS,
        };
        let access = self.sign(&base)?;

        let refresh_claims = Claims {
            kind: TokenKind::Refresh,
            exp: now + REFRESH_TOKEN_SECONDS,
            ..base
        };
        let refresh = self.sign(&refresh_claims)?;

        Ok(TokenPair { access, refresh })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|_| TokenError::Invalid)
    }

    /// Distinguishes `Invalid` (malformed, wrong signature) from `Expired`
    /// so the caller can decide whether to refresh or force a re-login.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

impl Default for TokenSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_distinct_access_and_refresh_tokens_with_matching_identity() {
        let signer = TokenSigner::new();
        let pair = signer.issue("u1", "acc1", "ns1", "cf-token").unwrap();
        assert_ne!(pair.access, pair.refresh);

        let access_claims = signer.verify(&pair.access).unwrap();
        assert_eq!(access_claims.kind, TokenKind::Access);
        assert_eq!(access_claims.account_id, "acc1");

        let refresh_claims = signer.verify(&pair.refresh).unwrap();
        assert_eq!(refresh_claims.kind, TokenKind::Refresh);
        assert!(refresh_claims.exp > access_claims.exp);
    }

    #[test]
    fn tampered_token_is_invalid() {
        let signer = TokenSigner::new();
        let pair = signer.issue("u1", "acc1", "ns1", "cf-token").unwrap();
        let mut tampered = pair.access.clone();
        tampered.push('x');
        assert!(matches!(signer.verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn expired_token_is_distinguished_from_invalid() {
        let signer = TokenSigner::new();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let claims = Claims {
            user_id: "u1".into(),
            account_id: "acc1".into(),
            namespace_id: "ns1".into(),
            cf_token: "cf".into(),
            kind: TokenKind::Access,
            iat: now - 100,
            exp: now - 1,
        };
        let expired = signer.sign(&claims).unwrap();
        assert!(matches!(signer.verify(&expired), Err(TokenError::Expired)));
    }
}
