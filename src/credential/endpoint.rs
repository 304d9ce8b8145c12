//! `SelectEndpoint` (§4.1): scans a discovered endpoint list and returns the
//! first entry whose advertised identity tokens include the requested type.
//! Nothing is mutated; ties are broken by discovery order.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    cfg::enums::ConnectionType,
    error::{GatewayError, Result},
    transport::Endpoint,
};

pub fn select_endpoint(
    endpoints: &[Endpoint],
    required_token_type: ConnectionType,
) -> Result<Endpoint> {
    endpoints
        .iter()
        .find(|e| e.user_identity_tokens.contains(&required_token_type))
        .cloned()
        .ok_or_else(|| {
            GatewayError::credential(
                "credential.select_endpoint",
                format!("no endpoint advertises token type {required_token_type}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::enums::{MessageSecurityMode, SecurityPolicy};

    fn endpoint(tokens: Vec<ConnectionType>) -> Endpoint {
        Endpoint {
            url: "opc.tcp://fake:4840".to_string(),
            security_policy: SecurityPolicy::Basic256Sha256,
            security_mode: MessageSecurityMode::SignAndEncrypt,
            user_identity_tokens: tokens,
        }
    }

    #[test]
    fn picks_first_matching_endpoint_in_discovery_order() {
        let endpoints = vec![
            endpoint(vec![ConnectionType::Anonymous]),
            endpoint(vec![ConnectionType::Certificate]),
            endpoint(vec![ConnectionType::Certificate]),
        ];
        let picked = select_endpoint(&endpoints, ConnectionType::Certificate)
            .expect("second endpoint should match");
        assert_eq!(picked.url, endpoints[1].url);
    }

    #[test]
    fn errors_when_no_endpoint_matches() {
        let endpoints = vec![endpoint(vec![ConnectionType::Anonymous])];
        let err = select_endpoint(&endpoints, ConnectionType::Certificate)
            .expect_err("no endpoint advertises certificate auth");
        assert!(matches!(err, GatewayError::Credential { .. }));
    }
}
