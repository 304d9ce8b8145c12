//! Industrial data-acquisition gateway for CNC controllers.
//!
//! Dials machine controllers over an abstract field protocol, keeps the
//! sessions alive, polls a model-specific node set on an interval, and
//! republishes the decoded telemetry onto an event bus. See `SPEC_FULL.md`
//! in the repository root for the full design.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod bus;
pub mod cfg;
pub mod codec;
pub mod credential;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod polling;
pub mod pool;
pub mod registry;
pub mod state;
pub mod transport;

pub use error::{GatewayError, Result};
