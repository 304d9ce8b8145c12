//! The Machine-Data Codec of §4.5: per-(manufacturer, model) table of
//! relevant node identifiers and a pure decoder from `(node_id, variant)` to
//! a side effect on a `MachineData` record, plus the canonical wire record.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod heidenhain_tnc640;

use serde::Serialize;

use crate::{error::Result, transport::Variant};

/// The manufacturer-agnostic JSON document emitted to the event bus each
/// tick (§6).
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct CanonicalRecord {
    pub machine_id: String,
    pub timestamp: String,
    pub machine_state: String,
    pub feed_override: u32,
    pub power_on_time: String,
    pub operating_time: String,
    pub cutting_time: String,
    pub axis_infos: Vec<AxisInfo>,
    pub current_program: CurrentProgram,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct AxisInfo {
    pub name: String,
    pub position: f64,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct CurrentProgram {
    pub program_name: String,
    pub program_number: u32,
    pub g_code_line: String,
}

/// One manufacturer/model family's decoder (§4.5 contract).
pub trait MachineData: Send + Sync + std::fmt::Debug {
    /// The exact node-id set a tick must read, in read order.
    fn relevant_node_ids(&self) -> &'static [&'static str];

    /// Applies one node reading to the in-progress record. Unknown node ids
    /// are `NotFound`; known ids with an unexpected variant shape are
    /// `Validation`.
    fn decode(&mut self, node_id: &str, value: Variant) -> Result<()>;

    /// Produces the wire record, deriving fields like formatted uptimes and
    /// the current-program block from whatever was accumulated so far.
    fn to_response(&self) -> CanonicalRecord;

    /// The machine's reported serial number, used as the bus routing key
    /// (falls back to empty string per §4.4 step 5).
    fn serial_number(&self) -> String;
}

/// `MachineDataFactory(mfr, model)`: returns `None` for any pair the codec
/// does not support; the poller handles that by skipping the tick.
pub fn machine_data_factory(
    manufacturer: &str,
    model: &str,
) -> Option<Box<dyn MachineData>> {
    match (manufacturer.to_ascii_lowercase().as_str(), model.to_ascii_lowercase().as_str())
    {
        ("heidenhain", "tnc640") => {
            Some(Box::new(heidenhain_tnc640::HeidenhainTnc640Data::default()))
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_returns_none_for_unsupported_family() {
        assert!(machine_data_factory("fanuc", "30i").is_none());
    }

    #[test]
    fn factory_is_case_insensitive() {
        assert!(machine_data_factory("Heidenhain", "TNC640").is_some());
    }
}
