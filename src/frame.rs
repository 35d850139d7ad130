//! Frame codec (spec.md §4.1).
//!
//! Splits an append-only byte buffer into length-delimited LLRP messages
//! and serializes outbound ones. The codec never blocks and never discards
//! bytes except by consuming a complete frame.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LlrpError, LlrpResult};

pub const HEADER_LEN: usize = 10;

/// A decoded frame: message type, message ID, and payload bytes (the
/// 10-byte header stripped off).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub message_type: u16,
  pub message_id: u32,
  pub payload: Vec<u8>,
}

/// Attempts to pull one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` when fewer than `HEADER_LEN` bytes, or fewer than
/// `total_length` bytes, are currently buffered (this is "not enough
/// bytes yet", not an error: spec.md §4.1 says `FrameTooShort` never escapes).
/// On success the consumed bytes are removed from `buf`. Loop on this
/// function to drain every complete frame currently buffered.
pub fn decode_frame(buf: &mut BytesMut) -> LlrpResult<Option<Frame>> {
  if buf.len() < HEADER_LEN {
    return Ok(None);
  }

  let total_length = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
  if total_length < HEADER_LEN as u32 {
    return Err(LlrpError::FrameLengthInvalid(total_length));
  }

  if buf.len() < total_length as usize {
    return Ok(None);
  }

  let mut frame_bytes = buf.split_to(total_length as usize);

  let first_two = frame_bytes.get_u16();
  let message_type = first_two & 0x03FF;
  let _total_length = frame_bytes.get_u32();
  let message_id = frame_bytes.get_u32();
  let payload = frame_bytes.to_vec();

  Ok(Some(Frame {
    message_type,
    message_id,
    payload,
  }))
}

/// Encodes `(message_type, message_id, payload)` into the 10-byte LLRP
/// header followed by the payload. Version is fixed at 1 on outbound
/// messages, encoded per spec.md §9 OQ3: byte 0 = `0x04 | ((type >> 8) &
/// 0x03)`, byte 1 = `type & 0xFF`.
pub fn encode_frame(message_type: u16, message_id: u32, payload: &[u8]) -> BytesMut {
  let total_length = (HEADER_LEN + payload.len()) as u32;

  let mut buf = BytesMut::with_capacity(total_length as usize);
  buf.put_u8(0x04 | ((message_type >> 8) & 0x03) as u8);
  buf.put_u8((message_type & 0xFF) as u8);
  buf.put_u32(total_length);
  buf.put_u32(message_id);
  buf.extend_from_slice(payload);

  buf
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_round_trip() {
    for message_type in [0u16, 1, 61, 511, 1023] {
      let payload = vec![0xAAu8; 37];
      let encoded = encode_frame(message_type, 42, &payload);

      assert_eq!(encoded[0], 0b0000_0100 | ((message_type >> 8) & 0x03) as u8);

      let mut buf = BytesMut::from(&encoded[..]);
      let frame = decode_frame(&mut buf).unwrap().unwrap();

      assert_eq!(frame.message_type, message_type);
      assert_eq!(frame.message_id, 42);
      assert_eq!(frame.payload, payload);
      assert!(buf.is_empty());
    }
  }

  #[test]
  fn incomplete_header_yields_none() {
    let mut buf = BytesMut::from(&[0u8, 1, 2, 3][..]);
    assert_eq!(decode_frame(&mut buf).unwrap(), None);
  }

  #[test]
  fn incomplete_payload_yields_none() {
    let encoded = encode_frame(61, 1, &[1, 2, 3, 4]);
    let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
    assert_eq!(decode_frame(&mut buf).unwrap(), None);
  }

  #[test]
  fn short_total_length_is_invalid() {
    let mut buf = BytesMut::new();
    buf.put_u16(0x0400);
    buf.put_u32(9); // < HEADER_LEN
    buf.put_u32(1);
    assert!(matches!(
      decode_frame(&mut buf),
      Err(LlrpError::FrameLengthInvalid(9))
    ));
  }

  #[test]
  fn multiple_frames_drain_in_order() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&encode_frame(1, 1, &[]));
    buf.extend_from_slice(&encode_frame(2, 2, &[9, 9]));

    let first = decode_frame(&mut buf).unwrap().unwrap();
    let second = decode_frame(&mut buf).unwrap().unwrap();

    assert_eq!(first.message_id, 1);
    assert_eq!(second.message_id, 2);
    assert_eq!(decode_frame(&mut buf).unwrap(), None);
  }
}
