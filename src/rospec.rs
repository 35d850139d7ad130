//! ROSpec builder (spec.md §4.4).
//!
//! Produces a single TLV(177) parameterised by the active antennas,
//! per-antenna power index, and the resolved hop-table ID. The hard
//! design constraints in §4.4 (no C1G2InventoryCommand, report mask
//! 0x0000, 5-byte stop triggers even when Null) are load-bearing on
//! target firmware and must not be "simplified" away.

use std::collections::BTreeMap;

use crate::params::encode_tlv;
use crate::types::param;

pub const ROSPEC_ID: u32 = 1;

/// Per-antenna inputs the caller has already resolved from capabilities
/// (spec.md §4.6 power-index computation / hop-table selection).
#[derive(Debug, Clone)]
pub struct AntennaPlan {
  pub antenna_id: u16,
  pub power_index: u16,
}

/// Builds the ADD_ROSPEC payload: `ROSpec(177) = Header || ROBoundarySpec
/// (178) || AISpec(183) || ROReportSpec(237)`.
pub fn build_rospec(antennas: &[AntennaPlan], hop_table_id: u16) -> Vec<u8> {
  assert!(!antennas.is_empty(), "ROSpec requires at least one antenna");

  let mut body = Vec::new();

  // Header: ROSpecID u32, Priority u8 = 0, CurrentState u8 = 0 (Disabled).
  body.extend_from_slice(&ROSPEC_ID.to_be_bytes());
  body.push(0x00);
  body.push(0x00);

  body.extend_from_slice(&encode_tlv(param::RO_BOUNDARY_SPEC, &build_ro_boundary_spec()));
  body.extend_from_slice(&encode_tlv(param::AI_SPEC, &build_ai_spec(antennas, hop_table_id)));
  body.extend_from_slice(&encode_tlv(param::RO_REPORT_SPEC, &build_ro_report_spec()));

  encode_tlv(param::RO_SPEC, &body)
}

fn build_ro_boundary_spec() -> Vec<u8> {
  let mut out = Vec::new();
  // ROSpecStartTrigger(179): TriggerType u8 = 0 (Null).
  out.extend_from_slice(&encode_tlv(param::RO_SPEC_START_TRIGGER, &[0x00]));
  // ROSpecStopTrigger(182): TriggerType u8 = 0; Duration u32 = 0 (5 bytes always).
  out.extend_from_slice(&encode_tlv(param::RO_SPEC_STOP_TRIGGER, &stop_trigger_value()));
  out
}

fn stop_trigger_value() -> [u8; 5] {
  let mut v = [0u8; 5];
  v[0] = 0x00; // TriggerType = Null
  v[1..5].copy_from_slice(&0u32.to_be_bytes()); // Duration, mandatory even when Null
  v
}

fn build_ai_spec(antennas: &[AntennaPlan], hop_table_id: u16) -> Vec<u8> {
  let mut out = Vec::new();

  out.extend_from_slice(&(antennas.len() as u16).to_be_bytes());
  for antenna in antennas {
    out.extend_from_slice(&antenna.antenna_id.to_be_bytes());
  }

  out.extend_from_slice(&encode_tlv(param::AI_SPEC_STOP_TRIGGER, &stop_trigger_value()));
  out.extend_from_slice(&encode_tlv(
    param::INVENTORY_PARAMETER_SPEC,
    &build_inventory_parameter_spec(antennas, hop_table_id),
  ));

  out
}

fn build_inventory_parameter_spec(antennas: &[AntennaPlan], hop_table_id: u16) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&1u16.to_be_bytes()); // SpecID = 1
  out.push(0x01); // ProtocolID = 1 (EPCGlobalClass1Gen2)

  for antenna in antennas {
    out.extend_from_slice(&encode_tlv(
      param::ANTENNA_CONFIGURATION,
      &build_antenna_configuration(antenna, hop_table_id),
    ));
  }

  out
}

fn build_antenna_configuration(antenna: &AntennaPlan, hop_table_id: u16) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&antenna.antenna_id.to_be_bytes());
  // AntennaConfiguration MUST NOT carry a C1G2InventoryCommand (330), which
  // causes silent reporting failure on target hardware (spec.md §4.4).
  out.extend_from_slice(&encode_tlv(
    param::RF_TRANSMITTER,
    &build_rf_transmitter(antenna, hop_table_id),
  ));
  out
}

fn build_rf_transmitter(antenna: &AntennaPlan, hop_table_id: u16) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&hop_table_id.to_be_bytes());
  out.extend_from_slice(&0u16.to_be_bytes()); // ChannelIndex = 0
  out.extend_from_slice(&antenna.power_index.to_be_bytes());
  out
}

fn build_ro_report_spec() -> Vec<u8> {
  let mut out = Vec::new();
  out.push(0x01); // ROReportTrigger = 1 (UponNTagsOrEndOfROSpec)
  out.extend_from_slice(&1u16.to_be_bytes()); // N = 1
  // TagReportContentSelector mask MUST be 0x0000 (default fields); a
  // broader mask degrades reporting on target hardware (spec.md §4.4).
  out.extend_from_slice(&encode_tlv(param::TAG_REPORT_CONTENT_SELECTOR, &0u16.to_be_bytes()));
  out
}

/// Resolves each configured antenna's target dBm to a power-table index
/// (spec.md §4.6). `power_dbm` maps antenna -> target dBm; missing
/// entries default to 30.0 (spec.md §3).
pub fn resolve_antenna_plans(
  antennas: &std::collections::BTreeSet<u16>,
  power_dbm: &BTreeMap<u16, f32>,
  power_table: &crate::capabilities::PowerTable,
) -> Vec<AntennaPlan> {
  antennas
    .iter()
    .map(|&antenna_id| {
      let target_dbm = power_dbm.get(&antenna_id).copied().unwrap_or(30.0);
      let power_index = if power_table.is_empty() {
        target_dbm.round().clamp(1.0, 100.0) as u16
      } else {
        power_table.nearest_index(target_dbm).unwrap_or(1)
      };
      AntennaPlan { antenna_id, power_index }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::{decode_parameters, Parameter};

  #[test]
  fn builds_well_formed_rospec_tlv() {
    let antennas = vec![AntennaPlan { antenna_id: 1, power_index: 200 }];
    let encoded = build_rospec(&antennas, 1);

    let decoded = decode_parameters(&encoded, 0, encoded.len(), false).unwrap();
    assert_eq!(decoded.len(), 1);
    match &decoded[0] {
      Parameter::Tlv { param_type, body } => {
        assert_eq!(*param_type, param::RO_SPEC);
        assert_eq!(body.len(), encoded.len());
      }
      _ => panic!("expected TLV"),
    }
  }

  #[test]
  fn stop_triggers_are_always_five_bytes() {
    let v = stop_trigger_value();
    assert_eq!(v.len(), 5);
  }

  #[test]
  fn rf_transmitter_carries_hop_table_and_power_index() {
    let antenna = AntennaPlan { antenna_id: 2, power_index: 42 };
    let bytes = build_rf_transmitter(&antenna, 7);
    assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 7);
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0);
    assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 42);
  }

  #[test]
  fn resolve_plans_falls_back_without_power_table() {
    let mut antennas = std::collections::BTreeSet::new();
    antennas.insert(1u16);
    let power_dbm = BTreeMap::new(); // no entry -> defaults to 30.0
    let power_table = crate::capabilities::PowerTable::default();

    let plans = resolve_antenna_plans(&antennas, &power_dbm, &power_table);
    assert_eq!(plans[0].power_index, 30);
  }
}
