//! Parameter (TLV/TV) codec (spec.md §4.2).
//!
//! Decoding is expressed over byte ranges of a parent buffer; no parsed
//! parameter owns storage (spec.md §9: nested containers without
//! recursive ownership). A TLV's body range includes its own 4-byte
//! header so a caller can recurse into it from offset 4 without having to
//! special-case the top level.

use std::ops::Range;

use bytes::BufMut;

use crate::error::{LlrpError, LlrpResult};
use crate::types::{param, tv};

/// The maximum forward scan distance when resynchronising after a
/// malformed parameter inside a `TagReportData` body (spec.md §4.2).
const RESYNC_WINDOW: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
  Tlv { param_type: u16, body: Range<usize> },
  Tv { tv_type: u8, value: Range<usize> },
}

/// Encodes a TLV parameter: `u16(type) || u16(4 + len(value)) || value`.
pub fn encode_tlv(param_type: u16, value: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(4 + value.len());
  out.put_u16(param_type);
  out.put_u16((4 + value.len()) as u16);
  out.extend_from_slice(value);
  out
}

/// Encodes a TV parameter: `u8(0x80 | tv_type) || value`.
pub fn encode_tv(tv_type: u8, value: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(1 + value.len());
  out.put_u8(0x80 | tv_type);
  out.extend_from_slice(value);
  out
}

/// Decodes every top-level parameter in `buf[lo..hi)`.
///
/// When `allow_resync` is false (the default for top-level message
/// parsing, spec.md §4.2 says this context is strict), any malformed
/// parameter is a hard error. When true (the `TagReportData`-body context
/// only), a malformed or unrecognised parameter triggers the
/// resynchronisation policy: scan forward up to `RESYNC_WINDOW` bytes for
/// a byte with the MSB set and resume there, or stop parsing (returning
/// what was already decoded) if none is found.
pub fn decode_parameters(buf: &[u8], lo: usize, hi: usize, allow_resync: bool) -> LlrpResult<Vec<Parameter>> {
  let mut params = Vec::new();
  let mut c = lo;

  loop {
    if c >= hi {
      break;
    }

    let first = buf[c];

    if first & 0x80 != 0 {
      let tv_type = first & 0x7F;

      match tv::value_len(tv_type) {
        Some(value_len) => {
          if c + 1 + value_len > hi {
            if allow_resync {
              break;
            }
            return Err(LlrpError::TagRecordMalformed(format!(
              "truncated TV parameter type {tv_type} at offset {c}"
            )));
          }

          params.push(Parameter::Tv {
            tv_type,
            value: (c + 1)..(c + 1 + value_len),
          });
          c += 1 + value_len;
        }

        None => {
          if allow_resync {
            match resync_forward(buf, c + 1, hi) {
              Some(resume_at) => {
                c = resume_at;
                continue;
              }
              None => break,
            }
          }

          return Err(LlrpError::TagRecordMalformed(format!(
            "unknown TV parameter type {tv_type} at offset {c}"
          )));
        }
      }
    } else {
      if c + 4 > hi {
        if allow_resync {
          break;
        }
        return Err(LlrpError::TagRecordMalformed(format!(
          "truncated TLV header at offset {c}"
        )));
      }

      let raw_type = u16::from_be_bytes([buf[c], buf[c + 1]]);
      let param_type = param::mask(raw_type);
      let length = u16::from_be_bytes([buf[c + 2], buf[c + 3]]) as usize;

      if length < 4 || c + length > hi {
        if allow_resync {
          match resync_forward(buf, c + 1, hi) {
            Some(resume_at) => {
              c = resume_at;
              continue;
            }
            None => break,
          }
        }
        return Err(LlrpError::TagRecordMalformed(format!(
          "invalid TLV length {length} for type {param_type} at offset {c}"
        )));
      }

      params.push(Parameter::Tlv {
        param_type,
        body: c..(c + length),
      });
      c += length;
    }
  }

  Ok(params)
}

fn resync_forward(buf: &[u8], from: usize, hi: usize) -> Option<usize> {
  let limit = (from + RESYNC_WINDOW).min(hi);
  (from..limit).find(|&i| buf[i] & 0x80 != 0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tlv_round_trip() {
    for param_type in [0u16, 1, 177, 1023] {
      let value = vec![0x11u8, 0x22, 0x33];
      let encoded = encode_tlv(param_type, &value);

      let decoded = decode_parameters(&encoded, 0, encoded.len(), false).unwrap();
      assert_eq!(decoded.len(), 1);

      match &decoded[0] {
        Parameter::Tlv { param_type: pt, body } => {
          assert_eq!(*pt, param_type);
          assert_eq!(&encoded[body.clone()][4..], &value[..]);
        }
        _ => panic!("expected TLV"),
      }
    }
  }

  #[test]
  fn tv_advances_exact_size() {
    let encoded = encode_tv(tv::ANTENNA_ID, &[0x00, 0x03]);
    let decoded = decode_parameters(&encoded, 0, encoded.len(), false).unwrap();
    assert_eq!(decoded.len(), 1);
    match &decoded[0] {
      Parameter::Tv { tv_type, value } => {
        assert_eq!(*tv_type, tv::ANTENNA_ID);
        assert_eq!(value.len(), 2);
      }
      _ => panic!("expected TV"),
    }
  }

  #[test]
  fn unknown_tv_strict_errors() {
    let buf = [0x80 | 0x7Fu8];
    assert!(decode_parameters(&buf, 0, buf.len(), false).is_err());
  }

  #[test]
  fn unknown_tv_resync_skips_to_next_msb_byte() {
    // Unknown TV type 0x7F followed by garbage, then a valid TV (AntennaID=1).
    let mut buf = vec![0x80 | 0x7Fu8, 0x01, 0x02];
    buf.extend_from_slice(&encode_tv(tv::ANTENNA_ID, &[0x00, 0x05]));

    let decoded = decode_parameters(&buf, 0, buf.len(), true).unwrap();
    assert_eq!(decoded.len(), 1);
    match &decoded[0] {
      Parameter::Tv { tv_type, .. } => assert_eq!(*tv_type, tv::ANTENNA_ID),
      _ => panic!("expected TV"),
    }
  }

  #[test]
  fn resync_gives_up_after_window_and_keeps_prior_results() {
    let mut buf = encode_tv(tv::ANTENNA_ID, &[0x00, 0x01]);
    buf.push(0x80 | 0x7F); // unknown TV
    buf.extend_from_slice(&[0u8; 20]); // no MSB-set byte within window

    let decoded = decode_parameters(&buf, 0, buf.len(), true).unwrap();
    assert_eq!(decoded.len(), 1);
  }

  #[test]
  fn malformed_tlv_length_strict_errors() {
    let mut buf = Vec::new();
    buf.put_u16(177);
    buf.put_u16(2); // < 4, invalid
    assert!(decode_parameters(&buf, 0, buf.len(), false).is_err());
  }
}
