//! LLRP message-type and parameter-type constants used by this client.
//!
//! Only the type space the session controller actually drives (spec.md §6)
//! is represented; the LLRP standard defines many more message and
//! parameter types than a Gen2-inventory-only client needs.

/// LLRP message type constants (§6).
pub mod message {
  pub const GET_READER_CAPABILITIES: u16 = 1;
  pub const GET_READER_CAPABILITIES_RESPONSE: u16 = 11;
  pub const CLOSE_CONNECTION: u16 = 14;
  pub const ADD_ROSPEC: u16 = 20;
  pub const ADD_ROSPEC_RESPONSE: u16 = 30;
  pub const DELETE_ROSPEC: u16 = 21;
  pub const DELETE_ROSPEC_RESPONSE: u16 = 31;
  pub const START_ROSPEC: u16 = 22;
  pub const START_ROSPEC_RESPONSE: u16 = 32;
  pub const ENABLE_ROSPEC: u16 = 24;
  pub const ENABLE_ROSPEC_RESPONSE: u16 = 34;
  pub const RO_ACCESS_REPORT: u16 = 61;
  pub const KEEPALIVE: u16 = 62;
  pub const READER_EVENT_NOTIFICATION: u16 = 63;
  pub const ENABLE_EVENTS_AND_REPORTS: u16 = 64;
  pub const KEEPALIVE_ACK: u16 = 72;
  pub const ERROR_MESSAGE: u16 = 100;
}

/// TLV parameter type constants (§3, §4.3, §4.4, §4.5).
pub mod param {
  pub const LLRP_STATUS: u16 = 287;
  pub const FIELD_ERROR: u16 = 288;
  pub const PARAMETER_ERROR: u16 = 289;
  pub const REGULATORY_CAPABILITIES: u16 = 143;
  pub const UHF_BAND_CAPABILITIES: u16 = 144;
  pub const TRANSMIT_POWER_LEVEL_TABLE_ENTRY: u16 = 145;
  pub const FREQUENCY_HOP_TABLE: u16 = 147;
  pub const RO_SPEC: u16 = 177;
  pub const RO_BOUNDARY_SPEC: u16 = 178;
  pub const RO_SPEC_START_TRIGGER: u16 = 179;
  pub const RO_SPEC_STOP_TRIGGER: u16 = 182;
  pub const AI_SPEC: u16 = 183;
  pub const AI_SPEC_STOP_TRIGGER: u16 = 184;
  pub const INVENTORY_PARAMETER_SPEC: u16 = 186;
  pub const RO_REPORT_SPEC: u16 = 237;
  pub const TAG_REPORT_CONTENT_SELECTOR: u16 = 238;
  pub const TAG_REPORT_DATA: u16 = 240;
  pub const EPC_DATA: u16 = 241;
  pub const ANTENNA_CONFIGURATION: u16 = 222;
  pub const RF_TRANSMITTER: u16 = 224;
  pub const C1G2_INVENTORY_COMMAND: u16 = 330;

  /// Low 10 bits of a parameter type field carry the type; the high bits
  /// are vendor/reserved and MUST be masked before comparison (§3).
  pub fn mask(raw: u16) -> u16 {
    raw & 0x03FF
  }
}

/// TV parameter type constants and their fixed value sizes (§3).
pub mod tv {
  pub const ANTENNA_ID: u8 = 1;
  pub const PEAK_RSSI: u8 = 6;
  pub const CHANNEL_INDEX: u8 = 7;
  pub const FIRST_SEEN_TIMESTAMP_UTC: u8 = 8;
  pub const LAST_SEEN_TIMESTAMP_UTC: u8 = 9;
  pub const TAG_SEEN_COUNT: u8 = 10;
  pub const EPC_96: u8 = 13;
  pub const ROSPEC_ID: u8 = 14;
  pub const SPEC_INDEX: u8 = 15;
  pub const INVENTORY_PARAMETER_SPEC_ID: u8 = 16;

  /// Returns the fixed value length (in bytes, not counting the type byte)
  /// for a known TV type, or `None` if the type is not one this client
  /// understands the size of.
  pub fn value_len(tv_type: u8) -> Option<usize> {
    match tv_type {
      ANTENNA_ID => Some(2),
      PEAK_RSSI => Some(1),
      CHANNEL_INDEX => Some(2),
      FIRST_SEEN_TIMESTAMP_UTC => Some(8),
      LAST_SEEN_TIMESTAMP_UTC => Some(8),
      TAG_SEEN_COUNT => Some(2),
      EPC_96 => Some(12),
      ROSPEC_ID => Some(4),
      SPEC_INDEX => Some(2),
      INVENTORY_PARAMETER_SPEC_ID => Some(2),
      _ => None,
    }
  }
}
