//! The error taxonomy of §7: seven kinds, each carrying the operation tag
//! that produced it so the HTTP edge can report both a status class and a
//! message without re-deriving context the caller already had.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// One of the seven error kinds of §7. Each layer that returns a
/// `GatewayError` is expected to have already tagged it with the operation
/// that failed (e.g. `registry.machine.get_by_uuid`).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{op}: validation failed: {message}")]
    Validation { op: &'static str, message: String },

    #[error("{op}: not found")]
    NotFound { op: &'static str },

    #[error("{op}: unreachable: {source}")]
    Unreachable {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{op}: credential error: {message}")]
    Credential { op: &'static str, message: String },

    #[error("{op}: session unhealthy")]
    Unhealthy { op: &'static str },

    #[error("{op}: persistence failed: {source}")]
    Persist {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{op}: internal error: {source}")]
    Internal {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl GatewayError {
    pub fn validation(op: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Validation {
            op,
            message: message.into(),
        }
    }

    pub fn not_found(op: &'static str) -> Self {
        GatewayError::NotFound { op }
    }

    pub fn unreachable(op: &'static str, source: std::io::Error) -> Self {
        GatewayError::Unreachable { op, source }
    }

    pub fn credential(op: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Credential {
            op,
            message: message.into(),
        }
    }

    pub fn unhealthy(op: &'static str) -> Self {
        GatewayError::Unhealthy { op }
    }

    pub fn persist(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        GatewayError::Persist {
            op,
            source: source.into(),
        }
    }

    pub fn internal(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        GatewayError::Internal {
            op,
            source: source.into(),
        }
    }

    /// Operation tag this error was raised under.
    pub fn op(&self) -> &'static str {
        match self {
            GatewayError::Validation { op, .. }
            | GatewayError::NotFound { op }
            | GatewayError::Unreachable { op, .. }
            | GatewayError::Credential { op, .. }
            | GatewayError::Unhealthy { op }
            | GatewayError::Persist { op, .. }
            | GatewayError::Internal { op, .. } => op,
        }
    }
}
