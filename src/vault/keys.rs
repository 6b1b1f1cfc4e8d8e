//! RSA-4096 shared keypair generation, CSR construction, and OpenSSH
//! public-key derivation.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

const RSA_BITS: usize = 4096;

/// Generates a fresh RSA-4096 keypair and a CSR under the fixed
/// `O=Xanthus K3s Deployment, OU=IT, C=US` subject. Domain hostnames are not
/// baked in here; the DNS/TLS provider client supplies SANs per request.
pub fn generate_keypair_and_csr() -> Result<(String, String)> {
    let mut rng = rand::rngs::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, RSA_BITS).context("failed to generate RSA-4096 key")?;
    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key as PKCS#8 PEM")?
        .to_string();

    let csr_pem = build_csr(&private_key_pem)?;
    Ok((private_key_pem, csr_pem))
}

/// Builds a PKCS#10 CSR for the fixed subject from an existing PKCS#8 PEM key.
pub fn build_csr(private_key_pem: &str) -> Result<String> {
    let key_pair = KeyPair::from_pem(private_key_pem).context("failed to load RSA key into CSR signer")?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .context("failed to initialize CSR parameters")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Xanthus K3s Deployment");
    dn.push(DnType::OrganizationalUnitName, "IT");
    dn.push(DnType::CountryName, "US");
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key_pair)
        .context("failed to sign CSR")?;
    Ok(csr.pem().context("failed to PEM-encode CSR")?)
}

/// Parses a PKCS#8 PEM private key and emits the matching OpenSSH
/// `ssh-rsa AAAA…` public-key line (no trailing newline, no comment).
pub fn private_key_to_openssh(private_key_pem: &str) -> Result<String> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .context("failed to parse RSA private key")?;
    let public_key = RsaPublicKey::from(&private_key);
    encode_openssh_public_key(&public_key)
}

fn encode_openssh_public_key(public_key: &RsaPublicKey) -> Result<String> {
    use rsa::traits::PublicKeyParts;

    let mut buf = Vec::new();
    write_ssh_string(&mut buf, b"ssh-rsa");
    write_mpint(&mut buf, &public_key.e().to_bytes_be());
    write_mpint(&mut buf, &public_key.n().to_bytes_be());

    Ok(format!("ssh-rsa {}", BASE64.encode(buf)))
}

fn write_ssh_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// SSH mpint encoding: big-endian, with a leading zero byte if the most
/// significant bit would otherwise be mistaken for a sign bit.
fn write_mpint(buf: &mut Vec<u8>, be_bytes: &[u8]) {
    let mut bytes = be_bytes.to_vec();
    while bytes.first() == Some(&0) && bytes.len() > 1 {
        bytes.remove(0);
    }
    if bytes.first().map(|b| b & 0x80 != 0).unwrap_or(false) {
        bytes.insert(0, 0);
    }
    write_ssh_string(buf, &bytes);
}

/// Parses back the `ssh-rsa AAAA…` line this module produces, returning the
/// `(e, n)` pair for round-trip verification in tests.
#[cfg(test)]
fn decode_openssh_public_key(line: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let b64 = line
        .strip_prefix("ssh-rsa ")
        .context("missing ssh-rsa prefix")?;
    let raw = BASE64.decode(b64.trim())?;
    let mut cursor = raw.as_slice();

    let read_field = |cursor: &mut &[u8]| -> Result<Vec<u8>> {
        anyhow::ensure!(cursor.len() >= 4, "truncated field length");
        let (len_bytes, rest) = cursor.split_at(4);
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
        anyhow::ensure!(rest.len() >= len, "truncated field body");
        let (field, rest) = rest.split_at(len);
        *cursor = rest;
        Ok(field.to_vec())
    };

    let algo = read_field(&mut cursor)?;
    anyhow::ensure!(algo == b"ssh-rsa", "unexpected key algorithm");
    let e = read_field(&mut cursor)?;
    let n = read_field(&mut cursor)?;
    Ok((e, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    #[test]
    fn openssh_roundtrip_matches_pem_public_half() {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();

        let line = private_key_to_openssh(&pem).unwrap();
        assert!(line.starts_with("ssh-rsa "));
        assert!(!line.ends_with('\n'));

        let (e, n) = decode_openssh_public_key(&line).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let strip_leading_zero = |mut v: Vec<u8>| {
            while v.first() == Some(&0) && v.len() > 1 {
                v.remove(0);
            }
            v
        };
        assert_eq!(strip_leading_zero(e), public_key.e().to_bytes_be());
        assert_eq!(strip_leading_zero(n), public_key.n().to_bytes_be());
    }

    #[test]
    fn csr_carries_fixed_subject() {
        let (pem, csr) = generate_keypair_and_csr().unwrap();
        assert!(pem.contains("PRIVATE KEY"));
        assert!(csr.contains("CERTIFICATE REQUEST"));
    }
}
