//! `DecodeCertificate` (§4.1): PEM blocks of type `CERTIFICATE`, or raw DER.
//! Anything else is rejected.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use der::Decode;
use rsa::{RsaPublicKey, pkcs1::DecodeRsaPublicKey};
use x509_cert::Certificate as X509Certificate;

use crate::error::{GatewayError, Result};

const OP: &str = "credential.decode_certificate";

/// A decoded X.509 certificate, kept in its original DER form so a
/// byte-identical round trip is possible for DER-origin input.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn der_bytes(&self) -> &[u8] {
        &self.der
    }

    /// Extracts the certificate's RSA public key for `VerifyKeyMatchesCert`.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        let cert = X509Certificate::from_der(&self.der)
            .map_err(|e| GatewayError::credential(OP, e.to_string()))?;
        let spki = &cert.tbs_certificate.subject_public_key_info;
        let raw = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| GatewayError::credential(OP, "non-octet public key bits"))?;
        RsaPublicKey::from_pkcs1_der(raw)
            .map_err(|e| GatewayError::credential(OP, e.to_string()))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("der_len", &self.der.len())
            .finish()
    }
}

pub fn decode_certificate(bytes: &[u8]) -> Result<Certificate> {
    if let Ok(text) = std::str::from_utf8(bytes)
        && text.trim_start().starts_with("-----BEGIN")
    {
        return decode_pem(text.trim());
    }

    X509Certificate::from_der(bytes)
        .map_err(|e| GatewayError::credential(OP, e.to_string()))?;
    Ok(Certificate { der: bytes.to_vec() })
}

fn decode_pem(text: &str) -> Result<Certificate> {
    let first_line = text
        .lines()
        .next()
        .ok_or_else(|| GatewayError::credential(OP, "empty PEM input"))?;
    let label = first_line
        .strip_prefix("-----BEGIN ")
        .and_then(|s| s.strip_suffix("-----"))
        .ok_or_else(|| GatewayError::credential(OP, "malformed PEM header"))?;

    if label != "CERTIFICATE" {
        return Err(GatewayError::credential(
            OP,
            format!("unsupported PEM label: {label}"),
        ));
    }

    let cert = X509Certificate::from_pem(text.as_bytes())
        .map_err(|e| GatewayError::credential(OP, e.to_string()))?;
    let der = cert
        .to_der()
        .map_err(|e| GatewayError::credential(OP, e.to_string()))?;
    Ok(Certificate { der })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_certificate_bytes() {
        let err =
            decode_certificate(b"not a certificate").expect_err("garbage must fail");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }

    #[test]
    fn rejects_unsupported_pem_label() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
        let err =
            decode_certificate(pem.as_bytes()).expect_err("wrong label must fail");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }
}
