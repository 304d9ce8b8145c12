//! Heidenhain TNC640 node table and decoder, translated from the original
//! implementation's `machine_models.HeidenhainTNC640Data` (node-id switch and
//! `ToResponse` derivation, including the greatest-`call_stack_level`-wins
//! current-program rule and the millisecond-to-`HH:MM:SS` uptime format).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    codec::{AxisInfo, CanonicalRecord, CurrentProgram, MachineData},
    error::{GatewayError, Result},
    transport::{ExtensionObject, Variant},
};

const OP: &str = "codec.heidenhain_tnc640.decode";

/// The exact node-id set §6 names for this family, in read order.
const RELEVANT_NODE_IDS: &[&str] = &[
    "ns=1;i=56004",
    "ns=1;i=100024",
    "ns=1;i=100039",
    "ns=1;i=100003",
    "ns=1;i=100025",
    "ns=1;i=100026",
    "ns=1;i=300002",
    "ns=1;i=100029",
    "ns=1;i=100030",
    "ns=1;i=300004",
    "ns=1;i=100031",
    "ns=1;i=100027",
    "ns=1;i=100028",
    "ns=1;i=300003",
    "ns=1;i=56031",
    "ns=1;i=56033",
    "ns=1;i=56032",
    "ns=1;i=51002",
    "ns=1;i=100005",
    "ns=1;i=100006",
    "ns=1;i=100022",
    "ns=1;i=100010",
    "ns=1;i=100008",
];

#[derive(Debug, Clone, Default)]
struct EngineeringUnits {
    display_name: String,
    unit: String,
}

#[derive(Debug, Clone, Default)]
struct OverrideValue {
    value: u32,
    eu_range: Option<(f64, f64)>,
    engineering_units: Option<EngineeringUnits>,
}

#[derive(Debug, Clone, Default)]
pub struct HeidenhainTnc640Data {
    serial_number: Option<String>,
    operating_mode: Option<u32>,
    current_tool_name: Option<String>,
    cutter_locations: Vec<(String, f64)>,
    feed_override: OverrideValue,
    rapid_override: OverrideValue,
    rapid_traverse_active: Option<bool>,
    speed_override: OverrideValue,
    control_up_time: Option<f64>,
    machine_up_time: Option<f64>,
    program_execution_time: Option<f64>,
    current_state: Option<String>,
    last_transition: Option<String>,
    execution_stack: Vec<ProgramPosition>,
}

#[derive(Debug, Clone)]
struct ProgramPosition {
    call_stack_level: u32,
    block_number: u32,
    program_name: String,
    block_content: String,
}

impl MachineData for HeidenhainTnc640Data {
    fn relevant_node_ids(&self) -> &'static [&'static str] {
        RELEVANT_NODE_IDS
    }

    fn decode(&mut self, node_id: &str, value: Variant) -> Result<()> {
        match node_id {
            "ns=1;i=56004" => self.serial_number = Some(expect_string(node_id, value)?),

            "ns=1;i=100027" => self.speed_override.value = expect_uint32(node_id, value)?,
            "ns=1;i=100028" => {
                self.speed_override.eu_range = Some(expect_range(node_id, value)?)
            },
            "ns=1;i=300003" => {
                self.speed_override.engineering_units =
                    Some(expect_engineering_units(node_id, value)?)
            },

            "ns=1;i=100039" => {
                self.current_tool_name = Some(expect_string(node_id, value)?)
            },
            "ns=1;i=100003" => {
                self.cutter_locations = expect_extension_objects(node_id, value)?
                    .into_iter()
                    .filter_map(|eo| match eo {
                        ExtensionObject::CutterLocation { coordinate_name, position } => {
                            Some((coordinate_name, position))
                        },
                        _ => None,
                    })
                    .collect();
            },

            "ns=1;i=100025" => self.feed_override.value = expect_uint32(node_id, value)?,
            "ns=1;i=100026" => {
                self.feed_override.eu_range = Some(expect_range(node_id, value)?)
            },
            "ns=1;i=300002" => {
                self.feed_override.engineering_units =
                    Some(expect_engineering_units(node_id, value)?)
            },

            "ns=1;i=100024" => self.operating_mode = Some(expect_uint32(node_id, value)?),

            "ns=1;i=100029" => self.rapid_override.value = expect_uint32(node_id, value)?,
            "ns=1;i=100030" => {
                self.rapid_override.eu_range = Some(expect_range(node_id, value)?)
            },
            "ns=1;i=300004" => {
                self.rapid_override.engineering_units =
                    Some(expect_engineering_units(node_id, value)?)
            },
            "ns=1;i=100031" => {
                self.rapid_traverse_active = Some(expect_bool(node_id, value)?)
            },

            "ns=1;i=56031" => self.control_up_time = Some(expect_float(node_id, value)?),
            "ns=1;i=56033" => self.machine_up_time = Some(expect_float(node_id, value)?),
            "ns=1;i=56032" => {
                self.program_execution_time = Some(expect_float(node_id, value)?)
            },

            "ns=1;i=51002" | "ns=1;i=100010" => {
                self.current_state = Some(expect_localized_text(node_id, value)?)
            },
            "ns=1;i=100005" => {},
            "ns=1;i=100006" => {
                self.execution_stack = expect_extension_objects(node_id, value)?
                    .into_iter()
                    .filter_map(|eo| match eo {
                        ExtensionObject::ProgramPosition {
                            call_stack_level,
                            block_number,
                            program_name,
                            block_content,
                        } => Some(ProgramPosition {
                            call_stack_level,
                            block_number,
                            program_name,
                            block_content,
                        }),
                        _ => None,
                    })
                    .collect();
            },
            "ns=1;i=100022" => {},
            "ns=1;i=100008" => {
                self.last_transition = Some(expect_localized_text(node_id, value)?)
            },

            _other => return Err(GatewayError::not_found(OP)),
        }
        Ok(())
    }

    fn to_response(&self) -> CanonicalRecord {
        let mut current_program = CurrentProgram::default();
        let mut greatest_level: Option<u32> = None;
        for entry in &self.execution_stack {
            if greatest_level.is_none_or(|g| entry.call_stack_level >= g) {
                greatest_level = Some(entry.call_stack_level);
                current_program = CurrentProgram {
                    program_name: entry.program_name.clone(),
                    program_number: entry.block_number,
                    g_code_line: entry.block_content.clone(),
                };
            }
        }

        CanonicalRecord {
            machine_id: self.serial_number.clone().unwrap_or_default(),
            timestamp: String::new(),
            machine_state: self.last_transition.clone().unwrap_or_default(),
            feed_override: self.feed_override.value,
            power_on_time: format_uptime(self.machine_up_time),
            operating_time: format_uptime(self.control_up_time),
            cutting_time: format_uptime(self.program_execution_time),
            axis_infos: self
                .cutter_locations
                .iter()
                .map(|(name, position)| AxisInfo {
                    name: name.clone(),
                    position: *position,
                })
                .collect(),
            current_program,
        }
    }

    fn serial_number(&self) -> String {
        self.serial_number.clone().unwrap_or_default()
    }
}

/// Converts a millisecond duration to `HH:MM:SS`, matching the original's
/// `formatTime`. Missing values format to an empty string.
fn format_uptime(ms: Option<f64>) -> String {
    let Some(ms) = ms else { return String::new() };
    let total_seconds = (ms / 1000.0) as i64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn expect_string(node_id: &str, value: Variant) -> Result<String> {
    match value {
        Variant::String(s) => Ok(s),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_uint32(node_id: &str, value: Variant) -> Result<u32> {
    match value {
        Variant::UInt32(v) => Ok(v),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_float(node_id: &str, value: Variant) -> Result<f64> {
    match value {
        Variant::Float64(v) => Ok(v),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_bool(node_id: &str, value: Variant) -> Result<bool> {
    match value {
        Variant::Bool(v) => Ok(v),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_localized_text(node_id: &str, value: Variant) -> Result<String> {
    match value {
        Variant::LocalizedText(s) => Ok(s),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_range(node_id: &str, value: Variant) -> Result<(f64, f64)> {
    match value {
        Variant::Range { low, high } => Ok((low, high)),
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_engineering_units(node_id: &str, value: Variant) -> Result<EngineeringUnits> {
    match value {
        Variant::EngineeringUnits { display_name, unit } => {
            Ok(EngineeringUnits { display_name, unit })
        },
        _ => Err(type_mismatch(node_id)),
    }
}

fn expect_extension_objects(
    node_id: &str,
    value: Variant,
) -> Result<Vec<ExtensionObject>> {
    match value {
        Variant::ExtensionObjects(v) => Ok(v),
        _ => Err(type_mismatch(node_id)),
    }
}

fn type_mismatch(node_id: &str) -> GatewayError {
    GatewayError::validation(OP, format!("type mismatch for NodeID: {node_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_serial_and_feed_override() {
        let mut data = HeidenhainTnc640Data::default();
        data.decode("ns=1;i=56004", Variant::String("SN-1".to_string())).expect("test assertion");
        data.decode("ns=1;i=100025", Variant::UInt32(85)).expect("test assertion");
        let resp = data.to_response();
        assert_eq!(resp.machine_id, "SN-1");
        assert_eq!(resp.feed_override, 85);
        assert_eq!(data.serial_number(), "SN-1");
    }

    #[test]
    fn unknown_node_id_is_not_found() {
        let mut data = HeidenhainTnc640Data::default();
        let err = data.decode("ns=1;i=999999", Variant::Bool(true)).expect_err("test assertion");
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[test]
    fn mismatched_variant_shape_is_validation_error() {
        let mut data = HeidenhainTnc640Data::default();
        let err = data.decode("ns=1;i=56004", Variant::Bool(true)).expect_err("test assertion");
        assert!(matches!(err, GatewayError::Validation { .. }));
    }

    #[test]
    fn current_program_derives_from_greatest_call_stack_level() {
        let mut data = HeidenhainTnc640Data::default();
        data.decode(
            "ns=1;i=100006",
            Variant::ExtensionObjects(vec![
                ExtensionObject::ProgramPosition {
                    call_stack_level: 0,
                    block_number: 1,
                    program_name: "OUTER.H".to_string(),
                    block_content: "L X0".to_string(),
                },
                ExtensionObject::ProgramPosition {
                    call_stack_level: 2,
                    block_number: 42,
                    program_name: "INNER.H".to_string(),
                    block_content: "L X+10 F500".to_string(),
                },
            ]),
        )
        .expect("test assertion");
        let resp = data.to_response();
        assert_eq!(resp.current_program.program_name, "INNER.H");
        assert_eq!(resp.current_program.program_number, 42);
    }

    #[test]
    fn uptime_formats_as_hh_mm_ss() {
        assert_eq!(format_uptime(Some(3_661_000.0)), "01:01:01");
        assert_eq!(format_uptime(None), "");
    }
}
