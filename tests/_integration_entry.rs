// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#![allow(clippy::all)]

mod integration_tests {
    pub mod common;

    pub mod connect_persists_rows;
    pub mod polling_lifecycle;
    pub mod replace_on_reconnect;
    pub mod restart_restoration;
    pub mod unreachable_endpoint;
}
