//! Error kinds surfaced across a session boundary (spec.md §7).
//!
//! `FrameLengthInvalid` is the only frame-codec failure that ever reaches
//! here (a short read is represented as `Ok(None)` in the frame codec, not
//! as an error), so `FrameTooShort` has no public variant at all.

use thiserror::Error;

use crate::controller::SessionState;

#[derive(Error, Debug)]
pub enum LlrpError {
  #[error("frame length {0} is shorter than the 10-byte header")]
  FrameLengthInvalid(u32),

  #[error("unexpected message type {message_type} in state {state:?}")]
  UnexpectedMessage {
    message_type: u16,
    state: SessionState,
  },

  #[error("reader reported LLRPStatus code {code}: {description}")]
  LlrpStatus { code: u16, description: String },

  #[error("parameter error: type {param_type} code {code}")]
  ParameterError { param_type: u16, code: u16 },

  #[error("field error: field {field} code {code}")]
  FieldError { field: u16, code: u16 },

  #[error("capabilities message malformed: {0}")]
  CapabilitiesMalformed(String),

  #[error("capabilities rejected with status code {0}")]
  CapabilitiesRejected(u16),

  #[error("tag record malformed: {0}")]
  TagRecordMalformed(String),

  #[error("socket error: {0}")]
  SocketError(#[from] std::io::Error),

  #[error("timed out waiting to connect")]
  ConnectTimeout,

  #[error("invalid session configuration: {0}")]
  ConfigInvalid(#[from] serde_json::Error),
}

pub type LlrpResult<T> = Result<T, LlrpError>;
