//! `FromBase64` (§4.1): strict standard Base64 decoding. Whitespace is
//! treated as invalid input rather than silently stripped, since the wire
//! contract (§6) expects `certificate_b64`/`key_b64` to be exactly what a
//! standards-compliant Base64 encoder would emit.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{GatewayError, Result};

pub fn from_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s.as_bytes())
        .map_err(|e| GatewayError::credential("credential.from_base64", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_input() {
        let decoded = from_base64("aGVsbG8=").expect("valid base64 should decode");
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn rejects_embedded_whitespace() {
        let err = from_base64("aGVs bG8=").expect_err("whitespace must be rejected");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }

    #[test]
    fn rejects_non_base64_characters() {
        let err = from_base64("not!!valid!!").expect_err("garbage must be rejected");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }
}
