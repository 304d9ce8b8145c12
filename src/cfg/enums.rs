// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// OPC UA `SecurityPolicy` advertised by a machine's endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    #[serde(rename = "None")]
    None,
    #[serde(rename = "Basic128Rsa15")]
    Basic128Rsa15,
    #[serde(rename = "Basic256")]
    Basic256,
    #[serde(rename = "Basic256Sha256")]
    Basic256Sha256,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        SecurityPolicy::Basic256Sha256
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SecurityPolicy::None => "None",
            SecurityPolicy::Basic128Rsa15 => "Basic128Rsa15",
            SecurityPolicy::Basic256 => "Basic256",
            SecurityPolicy::Basic256Sha256 => "Basic256Sha256",
        })
    }
}

/// OPC UA `MessageSecurityMode` negotiated for a session.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSecurityMode {
    #[serde(rename = "None")]
    None,
    #[serde(rename = "Sign")]
    Sign,
    #[serde(rename = "SignAndEncrypt")]
    SignAndEncrypt,
}

impl Default for MessageSecurityMode {
    fn default() -> Self {
        MessageSecurityMode::SignAndEncrypt
    }
}

impl fmt::Display for MessageSecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageSecurityMode::None => "None",
            MessageSecurityMode::Sign => "Sign",
            MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
        })
    }
}

/// The three credential shapes a machine may be registered with.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[serde(rename = "anonymous")]
    Anonymous,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "certificate")]
    Certificate,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionType::Anonymous => "anonymous",
            ConnectionType::Password => "password",
            ConnectionType::Certificate => "certificate",
        })
    }
}

/// `status` column of the `machines` table — whether a poller is currently
/// registered for the session.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MachineStatus {
    Connected,
    Polled,
}
