//! `DecodePrivateKey` (§4.1): PEM (`RSA PRIVATE KEY` / `PRIVATE KEY`) or raw
//! DER, PKCS#8 tried before PKCS#1. Non-RSA keys are rejected.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use pkcs1::DecodeRsaPrivateKey;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{GatewayError, Result};

const OP: &str = "credential.decode_private_key";

/// A decoded RSA private key, ready to be handed to a dial that negotiates
/// certificate-based authentication.
#[derive(Clone)]
pub struct RsaKey {
    inner: RsaPrivateKey,
}

impl RsaKey {
    pub fn to_public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// PKCS#8 DER encoding, used to persist `key_der_bytes` regardless of
    /// which of the three accepted input forms the key arrived in.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_pkcs8_der()
            .map(|d| d.as_bytes().to_vec())
            .map_err(|e| GatewayError::credential(OP, e.to_string()))
    }
}

impl std::fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKey").finish_non_exhaustive()
    }
}

pub fn decode_private_key(bytes: &[u8]) -> Result<RsaKey> {
    if let Ok(text) = std::str::from_utf8(bytes)
        && text.trim_start().starts_with("-----BEGIN")
    {
        return decode_pem(text.trim());
    }

    if let Ok(inner) = RsaPrivateKey::from_pkcs8_der(bytes) {
        return Ok(RsaKey { inner });
    }
    if let Ok(inner) = RsaPrivateKey::from_pkcs1_der(bytes) {
        return Ok(RsaKey { inner });
    }

    Err(GatewayError::credential(
        OP,
        "key is neither PKCS#8 nor PKCS#1 DER",
    ))
}

fn decode_pem(text: &str) -> Result<RsaKey> {
    let label = pem_label(text).ok_or_else(|| {
        GatewayError::credential(OP, "malformed PEM block: missing BEGIN/END label")
    })?;

    match label.as_str() {
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(text)
            .map(|inner| RsaKey { inner })
            .map_err(|e| GatewayError::credential(OP, e.to_string())),
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_pem(text)
            .map(|inner| RsaKey { inner })
            .map_err(|e| GatewayError::credential(OP, e.to_string())),
        other => Err(GatewayError::credential(
            OP,
            format!("unsupported PEM label: {other}"),
        )),
    }
}

fn pem_label(text: &str) -> Option<String> {
    let first_line = text.lines().next()?;
    let inner = first_line
        .strip_prefix("-----BEGIN ")?
        .strip_suffix("-----")?;
    Some(inner.to_string())
}

#[cfg(test)]
mod tests {
    use pkcs1::EncodeRsaPrivateKey;
    use pkcs8::EncodePrivateKey;
    use rsa::rand_core::OsRng;

    use super::*;

    fn generate_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 512).expect("key generation should succeed")
    }

    #[test]
    fn decodes_pkcs8_pem() {
        let original = generate_key();
        let pem = original
            .to_pkcs8_pem(Default::default())
            .expect("pkcs8 pem encode should succeed");
        let decoded = decode_private_key(pem.as_bytes()).expect("pem should decode");
        assert_eq!(decoded.to_public_key().n(), original.to_public_key().n());
    }

    #[test]
    fn decodes_pkcs1_pem() {
        let original = generate_key();
        let pem = original
            .to_pkcs1_pem(Default::default())
            .expect("pkcs1 pem encode should succeed");
        let decoded = decode_private_key(pem.as_bytes()).expect("pem should decode");
        assert_eq!(decoded.to_public_key().e(), original.to_public_key().e());
    }

    #[test]
    fn decodes_pkcs8_der() {
        let original = generate_key();
        let der = original
            .to_pkcs8_der()
            .expect("pkcs8 der encode should succeed");
        let decoded =
            decode_private_key(der.as_bytes()).expect("der bytes should decode");
        assert_eq!(decoded.to_public_key().n(), original.to_public_key().n());
    }

    #[test]
    fn rejects_garbage() {
        let err =
            decode_private_key(b"not a key at all").expect_err("garbage must fail");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }
}
