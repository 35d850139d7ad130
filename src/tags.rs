//! Tag-report parser (spec.md §4.5).
//!
//! Decodes an `RO_ACCESS_REPORT` message body into a sequence of tag
//! observations, tolerating unknown TV parameters and short/malformed
//! records by dropping the offending record rather than the whole
//! message (spec.md §7: `TagRecordMalformed` never aborts the session).

use log::warn;

use crate::params::{decode_parameters, Parameter};
use crate::types::{param, tv};

/// `{ epc, antenna, rssi, seen_count, last_seen_utc_micros }` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagObservation {
  pub epc: Vec<u8>,
  pub antenna: Option<u16>,
  pub rssi: Option<i8>,
  pub seen_count: Option<u16>,
  pub last_seen_utc_micros: Option<u64>,
}

/// Decodes every `TagReportData`(240) in an `RO_ACCESS_REPORT` body
/// (everything after the 10-byte frame header). `sole_antenna`, when
/// `Some`, is synthesised onto any observation missing an AntennaID TV
/// (spec.md §4.5, §3: exactly one configured antenna).
pub fn parse_ro_access_report(body: &[u8], sole_antenna: Option<u16>) -> Vec<TagObservation> {
  let top = match decode_parameters(body, 0, body.len(), false) {
    Ok(top) => top,
    Err(e) => {
      warn!("RO_ACCESS_REPORT top-level parse failed: {e}");
      return Vec::new();
    }
  };

  let mut observations = Vec::new();

  for param in top {
    if let Parameter::Tlv { param_type, body: range } = param {
      if param_type != param::TAG_REPORT_DATA {
        continue;
      }

      match decode_tag_report_data(body, range.start + 4, range.end) {
        Some(mut obs) => {
          if obs.antenna.is_none() {
            obs.antenna = sole_antenna;
          }
          observations.push(obs);
        }
        None => {
          warn!(
            "dropped empty/malformed TagReportData: {:02x?}",
            &body[range]
          );
        }
      }
    }
  }

  observations
}

fn decode_tag_report_data(buf: &[u8], lo: usize, hi: usize) -> Option<TagObservation> {
  // Resynchronisation is enabled only inside a TagReportData body
  // (spec.md §4.2).
  let params = match decode_parameters(buf, lo, hi, true) {
    Ok(params) => params,
    Err(_) => return None,
  };

  let mut obs = TagObservation {
    epc: Vec::new(),
    antenna: None,
    rssi: None,
    seen_count: None,
    last_seen_utc_micros: None,
  };
  let mut have_epc = false;

  for param in params {
    match param {
      Parameter::Tv { tv_type, value } if tv_type == tv::ANTENNA_ID => {
        obs.antenna = Some(u16::from_be_bytes([buf[value.start], buf[value.start + 1]]));
      }

      Parameter::Tv { tv_type, value } if tv_type == tv::PEAK_RSSI => {
        obs.rssi = Some(buf[value.start] as i8);
      }

      Parameter::Tv { tv_type, value } if tv_type == tv::LAST_SEEN_TIMESTAMP_UTC => {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[value]);
        obs.last_seen_utc_micros = Some(u64::from_be_bytes(bytes));
      }

      Parameter::Tv { tv_type, value } if tv_type == tv::TAG_SEEN_COUNT => {
        obs.seen_count = Some(u16::from_be_bytes([buf[value.start], buf[value.start + 1]]));
      }

      Parameter::Tv { tv_type, value } if tv_type == tv::EPC_96 => {
        obs.epc = buf[value].to_vec();
        have_epc = true;
      }

      Parameter::Tlv { param_type, body } if param_type == param::EPC_DATA => {
        if let Some(epc) = decode_epc_data(&buf[body]) {
          obs.epc = epc;
          have_epc = true;
        }
      }

      _ => {}
    }
  }

  if have_epc {
    Some(obs)
  } else {
    None
  }
}

/// EPCData(241) = `u16 header.. || u16 EPCLengthInBits at body[4..6] || EPC
/// at body[6..]`. Uses `ceil(bits/8)` (spec.md §9 OQ1: `floor` truncates
/// partial trailing bytes; `ceil` is the LLRP-correct behaviour).
fn decode_epc_data(param_body: &[u8]) -> Option<Vec<u8>> {
  if param_body.len() < 6 {
    return None;
  }
  let bit_length = u16::from_be_bytes([param_body[4], param_body[5]]) as usize;
  let byte_length = bit_length.div_ceil(8);

  let epc_start = 6;
  let epc_end = epc_start + byte_length;
  if param_body.len() < epc_end {
    return None;
  }

  Some(param_body[epc_start..epc_end].to_vec())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::{encode_tlv, encode_tv};

  fn tag_report_data(inner: &[u8]) -> Vec<u8> {
    encode_tlv(param::TAG_REPORT_DATA, inner)
  }

  #[test]
  fn decodes_epc96_antenna_and_rssi_s4() {
    let mut inner = Vec::new();
    inner.extend_from_slice(&encode_tv(
      tv::EPC_96,
      &[0x30, 0x0A, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09],
    ));
    inner.extend_from_slice(&encode_tv(tv::ANTENNA_ID, &[0x00, 0x03]));
    inner.extend_from_slice(&encode_tv(tv::PEAK_RSSI, &[0xD8]));

    let body = tag_report_data(&inner);
    let observations = parse_ro_access_report(&body, None);

    assert_eq!(observations.len(), 1);
    let obs = &observations[0];
    assert_eq!(obs.epc.len(), 12);
    assert_eq!(obs.antenna, Some(3));
    assert_eq!(obs.rssi, Some(-40));
    assert_eq!(obs.seen_count, None);
  }

  #[test]
  fn synthesises_sole_antenna_s5() {
    let mut inner = Vec::new();
    inner.extend_from_slice(&encode_tv(tv::EPC_96, &[0u8; 12]));
    let body = tag_report_data(&inner);

    let observations = parse_ro_access_report(&body, Some(2));
    assert_eq!(observations[0].antenna, Some(2));
  }

  #[test]
  fn empty_record_is_dropped() {
    let inner = encode_tv(tv::ANTENNA_ID, &[0x00, 0x01]); // no EPC at all
    let body = tag_report_data(&inner);
    let observations = parse_ro_access_report(&body, None);
    assert!(observations.is_empty());
  }

  #[test]
  fn epc_data_ceil_rounds_partial_byte() {
    // 12 bits -> ceil(12/8) = 2 bytes, not floor's 1.
    let mut epc_data_body = Vec::new();
    epc_data_body.extend_from_slice(&0u16.to_be_bytes()); // reserved/header filler
    epc_data_body.extend_from_slice(&0u16.to_be_bytes()); // filler to reach offset 4
    epc_data_body.extend_from_slice(&12u16.to_be_bytes()); // bit length
    epc_data_body.extend_from_slice(&[0xAB, 0xC0]);

    let epc = decode_epc_data(&epc_data_body).unwrap();
    assert_eq!(epc.len(), 2);
  }

  #[test]
  fn unknown_tv_inside_record_resyncs_to_next_field() {
    let mut inner = vec![0x80 | 0x7Fu8, 0x00]; // unknown TV, garbage
    inner.extend_from_slice(&encode_tv(tv::EPC_96, &[0u8; 12]));
    let body = tag_report_data(&inner);

    let observations = parse_ro_access_report(&body, None);
    assert_eq!(observations.len(), 1);
  }
}
