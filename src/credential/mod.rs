//! The Credential Decoder of §4.1: turns raw certificate/key material in
//! DER, PEM, or Base64 form into a protocol-ready tuple, checks that a key
//! matches its certificate, and picks a compatible endpoint for a requested
//! token type.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod certificate;
pub mod encoding;
pub mod endpoint;
pub mod private_key;

pub use certificate::{Certificate, decode_certificate};
pub use encoding::from_base64;
pub use endpoint::select_endpoint;
pub use private_key::{RsaKey, decode_private_key};

use crate::error::{GatewayError, Result};

/// `VerifyKeyMatchesCert`: compares modulus and public exponent of `key`
/// against the public key embedded in `cert`.
pub fn verify_key_matches_cert(cert: &Certificate, key: &RsaKey) -> Result<()> {
    let cert_pub = cert.rsa_public_key()?;
    let key_pub = key.to_public_key();

    if cert_pub.n() == key_pub.n() && cert_pub.e() == key_pub.e() {
        Ok(())
    } else {
        Err(GatewayError::credential(
            "credential.verify_key_matches_cert",
            "private key does not match certificate public key",
        ))
    }
}

