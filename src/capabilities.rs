//! Capabilities parser (spec.md §4.3) and the PowerTable / HopTableSet
//! data model (spec.md §3, Properties 4 & 5).

use crate::error::{LlrpError, LlrpResult};
use crate::params::{decode_parameters, Parameter};
use crate::types::param;

/// `{ index, power_dbm }`, stored sorted ascending by `power_dbm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerTableEntry {
  pub index: u16,
  pub power_dbm: f32,
}

/// Capabilities-derived power table. Invariant: indices are unique;
/// `nearest_index` resolves a target dBm to the entry with the minimum
/// absolute difference, ties broken by lower index (Property 5).
#[derive(Debug, Clone, Default)]
pub struct PowerTable {
  entries: Vec<PowerTableEntry>,
}

impl PowerTable {
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> &[PowerTableEntry] {
    &self.entries
  }

  fn push_sorted(&mut self, entry: PowerTableEntry) {
    self.entries.push(entry);
    self.entries
      .sort_by(|a, b| a.power_dbm.partial_cmp(&b.power_dbm).unwrap());
  }

  /// Resolves `target_dbm` to the index whose entry minimises
  /// `|power_dbm - target_dbm|`, ties resolved to the lower index.
  pub fn nearest_index(&self, target_dbm: f32) -> Option<u16> {
    self
      .entries
      .iter()
      .min_by(|a, b| {
        let da = (a.power_dbm - target_dbm).abs();
        let db = (b.power_dbm - target_dbm).abs();
        da.partial_cmp(&db)
          .unwrap()
          .then_with(|| a.index.cmp(&b.index))
      })
      .map(|e| e.index)
  }
}

/// Ordered list of hop-table IDs in the order first observed (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct HopTableSet {
  ids: Vec<u16>,
}

impl HopTableSet {
  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn ids(&self) -> &[u16] {
    &self.ids
  }

  /// First ID in the parsed hop-table list, or the literal fallback `1`
  /// when none were advertised (spec.md §4.6).
  pub fn selected(&self) -> u16 {
    self.ids.first().copied().unwrap_or(1)
  }

  fn push(&mut self, id: u16) {
    if id != 0 {
      self.ids.push(id);
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
  pub power_table: PowerTable,
  pub hop_table_ids: HopTableSet,
}

/// Parses the body of a `GET_READER_CAPABILITIES_RESPONSE` (starting
/// after the 10-byte frame header). See spec.md §4.3 for the walk order.
pub fn parse_capabilities(body: &[u8]) -> LlrpResult<Capabilities> {
  let top = decode_parameters(body, 0, body.len(), false)?;

  let mut cursor = 0usize;
  if let Some(Parameter::Tlv { param_type, body: range }) = top.first() {
    if *param_type == param::LLRP_STATUS {
      let value = &body[range.clone()][4..];
      if value.len() < 2 {
        return Err(LlrpError::CapabilitiesMalformed(
          "LLRPStatus too short".into(),
        ));
      }
      let status_code = u16::from_be_bytes([value[0], value[1]]);
      if status_code != 0 {
        return Err(LlrpError::CapabilitiesRejected(status_code));
      }
      cursor = 1;
    }
  }

  let mut caps = Capabilities::default();

  for param in &top[cursor..] {
    if let Parameter::Tlv { param_type, body: range } = param {
      if *param_type == param::REGULATORY_CAPABILITIES {
        parse_regulatory_capabilities(body, range.clone(), &mut caps)?;
      }
    }
  }

  Ok(caps)
}

fn parse_regulatory_capabilities(
  buf: &[u8],
  range: std::ops::Range<usize>,
  caps: &mut Capabilities,
) -> LlrpResult<()> {
  // Skip 4 bytes of TLV header + 2 bytes CountryCode + 2 bytes
  // CommunicationsStandard before walking the sub-parameters (§4.3 step 2).
  let inner_lo = range.start + 8;
  let inner_hi = range.end;
  if inner_lo > inner_hi {
    return Err(LlrpError::CapabilitiesMalformed(
      "RegulatoryCapabilities shorter than its fixed header".into(),
    ));
  }

  let sub_params = decode_parameters(buf, inner_lo, inner_hi, false)?;

  for param in sub_params {
    if let Parameter::Tlv { param_type, body } = param {
      if param_type == crate::types::param::UHF_BAND_CAPABILITIES {
        parse_uhf_band_capabilities(buf, body, caps)?;
      }
    }
  }

  Ok(())
}

fn parse_uhf_band_capabilities(
  buf: &[u8],
  range: std::ops::Range<usize>,
  caps: &mut Capabilities,
) -> LlrpResult<()> {
  let inner_lo = range.start + 4;
  let inner_hi = range.end;
  let sub_params = decode_parameters(buf, inner_lo, inner_hi, false)?;

  for param in sub_params {
    match param {
      Parameter::Tlv { param_type, body } if param_type == param::TRANSMIT_POWER_LEVEL_TABLE_ENTRY => {
        if body.len() >= 8 {
          let v = &buf[body];
          let index = u16::from_be_bytes([v[4], v[5]]);
          let raw = i16::from_be_bytes([v[6], v[7]]);
          caps.power_table.push_sorted(PowerTableEntry {
            index,
            power_dbm: raw as f32 / 100.0,
          });
        }
      }

      Parameter::Tlv { param_type, body } if param_type == param::FREQUENCY_HOP_TABLE => {
        if body.len() >= 6 {
          let v = &buf[body];
          let id = u16::from_be_bytes([v[4], v[5]]);
          caps.hop_table_ids.push(id);
        }
      }

      _ => {}
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::encode_tlv;

  fn power_entry_bytes(index: u16, raw_hundredths: i16) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&index.to_be_bytes());
    v.extend_from_slice(&raw_hundredths.to_be_bytes());
    encode_tlv(param::TRANSMIT_POWER_LEVEL_TABLE_ENTRY, &v)
  }

  fn hop_table_bytes(id: u16) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&id.to_be_bytes());
    v.extend_from_slice(&0u16.to_be_bytes()); // number_of_hops, unused
    encode_tlv(param::FREQUENCY_HOP_TABLE, &v)
  }

  fn build_capabilities_response(entries: &[(u16, i16)], hop_ids: &[u16]) -> Vec<u8> {
    let mut uhf_band = Vec::new();
    for (index, raw) in entries {
      uhf_band.extend_from_slice(&power_entry_bytes(*index, *raw));
    }
    for id in hop_ids {
      uhf_band.extend_from_slice(&hop_table_bytes(*id));
    }
    let uhf_band_param = encode_tlv(param::UHF_BAND_CAPABILITIES, &uhf_band);

    let mut regulatory = Vec::new();
    regulatory.extend_from_slice(&840u16.to_be_bytes()); // CountryCode
    regulatory.extend_from_slice(&1u16.to_be_bytes()); // CommunicationsStandard
    regulatory.extend_from_slice(&uhf_band_param);

    encode_tlv(param::REGULATORY_CAPABILITIES, &regulatory)
  }

  #[test]
  fn parses_power_table_and_hop_ids_s1() {
    let body = build_capabilities_response(&[(1, 1000), (200, 3000)], &[1]);
    let caps = parse_capabilities(&body).unwrap();

    assert_eq!(caps.power_table.entries().len(), 2);
    assert_eq!(caps.power_table.entries()[0].index, 1);
    assert_eq!(caps.power_table.entries()[0].power_dbm, 10.0);
    assert_eq!(caps.power_table.entries()[1].index, 200);
    assert_eq!(caps.power_table.entries()[1].power_dbm, 30.0);
    assert_eq!(caps.hop_table_ids.selected(), 1);
    assert_eq!(caps.power_table.nearest_index(30.0), Some(200));
  }

  #[test]
  fn empty_capabilities_fall_back_s2() {
    let body = build_capabilities_response(&[], &[]);
    let caps = parse_capabilities(&body).unwrap();
    assert!(caps.power_table.is_empty());
    assert_eq!(caps.hop_table_ids.selected(), 1);
  }

  #[test]
  fn idempotent_parse_property4() {
    let body = build_capabilities_response(&[(1, 1000), (200, 3000), (50, 2000)], &[3, 7]);
    let a = parse_capabilities(&body).unwrap();
    let b = parse_capabilities(&body).unwrap();
    assert_eq!(
      a.power_table.entries().to_vec(),
      b.power_table.entries().to_vec()
    );
    assert_eq!(a.hop_table_ids.ids(), b.hop_table_ids.ids());
  }

  #[test]
  fn nearest_index_ties_favor_lower_index_property5() {
    let body = build_capabilities_response(&[(5, 2000), (1, 2000)], &[1]);
    let caps = parse_capabilities(&body).unwrap();
    // Sorted ascending by power_dbm; both entries are 20.0 dBm.
    assert_eq!(caps.power_table.nearest_index(20.0), Some(1));
  }

  #[test]
  fn rejected_status_surfaces_code() {
    let mut status = Vec::new();
    status.extend_from_slice(&100u16.to_be_bytes());
    status.extend_from_slice(&0u16.to_be_bytes());
    let body = encode_tlv(param::LLRP_STATUS, &status);

    let err = parse_capabilities(&body).unwrap_err();
    assert!(matches!(err, LlrpError::CapabilitiesRejected(100)));
  }
}
