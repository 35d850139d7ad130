//! Pure session state machine (spec.md §4.6, §9).
//!
//! Every transition is a function of `(state, inbound frame or timer)`;
//! side effects (outbound sends, timer arms, socket teardown, emitted
//! events) are returned as `Intent`s for the I/O layer (`session.rs`) to
//! apply. This separation is what lets the startup sequence and the
//! buffered-tag guard be exercised with scripted byte transcripts instead
//! of a live socket (spec.md §8 scenarios S1–S6).

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, warn};

use crate::capabilities::{parse_capabilities, Capabilities};
use crate::config::SessionConfig;
use crate::error::LlrpError;
use crate::frame::Frame;
use crate::params::{decode_parameters, Parameter};
use crate::rospec::{build_rospec, resolve_antenna_plans, AntennaPlan, ROSPEC_ID};
use crate::tags::{parse_ro_access_report, TagObservation};
use crate::types::{message, param};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Disconnected,
  Connecting,
  AwaitingCapabilities,
  AwaitingDeleteAck,
  AwaitingAddAck,
  AwaitingEnableAck,
  AwaitingStartAck,
  Running,
  ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
  /// 100 ms delay between ENABLE_EVENTS_AND_REPORTS and
  /// GET_READER_CAPABILITIES (spec.md §4.6).
  PostConnectDelay,
  /// Backoff before re-entering `Connecting` after an aborted session.
  ReconnectBackoff,
  /// Upper bound on waiting for the socket to close during shutdown.
  ShutdownGrace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
  Connected,
  Ready,
  Tag(TagObservation),
  Disconnected,
  Error(String),
}

#[derive(Debug)]
pub enum Intent {
  Send { message_type: u16, message_id: u32, payload: Vec<u8> },
  ArmTimer { timer: TimerKind, after: Duration },
  Emit(SessionEvent),
  CloseSocket,
  /// Attempt a fresh TCP connect after `delay` (zero for immediate).
  ScheduleReconnect { delay: Duration },
  /// No further reconnect will be attempted; the session has ended.
  End,
}

/// The session controller (spec.md §4.6). Owns only in-memory state;
/// the socket and receive buffer belong to the I/O layer.
pub struct Controller {
  pub config: SessionConfig,
  pub state: SessionState,
  next_message_id: u32,
  capabilities: Capabilities,
  antenna_plans: Vec<AntennaPlan>,
  rospec_started: bool,
}

impl Controller {
  pub fn new(config: SessionConfig) -> Self {
    Controller {
      config,
      state: SessionState::Disconnected,
      next_message_id: 1,
      capabilities: Capabilities::default(),
      antenna_plans: Vec::new(),
      rospec_started: false,
    }
  }

  fn alloc_message_id(&mut self) -> u32 {
    let id = self.next_message_id;
    self.next_message_id = self.next_message_id.wrapping_add(1);
    id
  }

  fn send(&mut self, message_type: u16, payload: Vec<u8>) -> Intent {
    let message_id = self.alloc_message_id();
    Intent::Send { message_type, message_id, payload }
  }

  fn reset_runtime_state(&mut self) {
    self.capabilities = Capabilities::default();
    self.antenna_plans.clear();
    self.rospec_started = false;
    self.next_message_id = 1;
  }

  /// Called by the I/O layer once the TCP socket is connected
  /// (`Disconnected -> Connecting`).
  pub fn on_tcp_connected(&mut self) -> Vec<Intent> {
    self.state = SessionState::Connecting;
    let mut intents = vec![Intent::Emit(SessionEvent::Connected)];
    intents.push(self.send(message::ENABLE_EVENTS_AND_REPORTS, Vec::new()));
    intents.push(Intent::ArmTimer {
      timer: TimerKind::PostConnectDelay,
      after: Duration::from_millis(100),
    });
    intents
  }

  /// Called when the user explicitly requests disconnection.
  pub fn on_disconnect_requested(&mut self) -> Vec<Intent> {
    self.state = SessionState::ShuttingDown;
    let mut intents = vec![self.send(message::CLOSE_CONNECTION, Vec::new())];
    intents.push(Intent::ArmTimer {
      timer: TimerKind::ShutdownGrace,
      after: Duration::from_millis(500),
    });
    intents
  }

  /// `reconfigure(antennas, power_dbm)` forces a stop+reconnect with the
  /// new configuration, bypassing `reconnect_interval_ms` and
  /// `enable_reconnect` (it is a deliberate restart, not an
  /// error-triggered one, per SPEC_FULL §6.2).
  pub fn on_reconfigure(&mut self, antennas: std::collections::BTreeSet<u16>, power_dbm: BTreeMap<u16, f32>) -> Vec<Intent> {
    self.config.antennas = antennas;
    self.config.power_dbm = power_dbm;
    self.reset_runtime_state();
    self.state = SessionState::Disconnected;
    vec![
      Intent::CloseSocket,
      Intent::ScheduleReconnect { delay: Duration::ZERO },
    ]
  }

  pub fn on_timer(&mut self, timer: TimerKind) -> Vec<Intent> {
    match (timer, self.state) {
      (TimerKind::PostConnectDelay, SessionState::Connecting) => {
        vec![self.send(message::GET_READER_CAPABILITIES, vec![0x00])]
      }

      (TimerKind::ShutdownGrace, SessionState::ShuttingDown) => {
        self.reset_runtime_state();
        self.state = SessionState::Disconnected;
        vec![
          Intent::CloseSocket,
          Intent::Emit(SessionEvent::Disconnected),
          Intent::End,
        ]
      }

      (TimerKind::ReconnectBackoff, _) => {
        vec![Intent::ScheduleReconnect { delay: Duration::ZERO }]
      }

      _ => vec![],
    }
  }

  /// Processes one inbound frame. This is the core dispatch of spec.md
  /// §4.6's startup table plus the steady-state Running behaviour.
  pub fn on_frame(&mut self, frame: &Frame) -> Vec<Intent> {
    // READER_EVENT_NOTIFICATION is a liveness no-op in every state; it
    // MUST NOT drive transitions (spec.md §4.6, §9 OQ4).
    if frame.message_type == message::READER_EVENT_NOTIFICATION {
      debug!("READER_EVENT_NOTIFICATION received in state {:?}", self.state);
      return vec![];
    }

    if frame.message_type == message::KEEPALIVE {
      return vec![self.send(message::KEEPALIVE_ACK, Vec::new())];
    }

    if frame.message_type == message::ERROR_MESSAGE {
      return self.abort(LlrpError::UnexpectedMessage {
        message_type: frame.message_type,
        state: self.state,
      });
    }

    if frame.message_type == message::RO_ACCESS_REPORT {
      return self.on_ro_access_report(frame);
    }

    match self.state {
      SessionState::Connecting if frame.message_type == message::GET_READER_CAPABILITIES_RESPONSE => {
        self.on_capabilities_response(frame)
      }

      SessionState::AwaitingCapabilities if frame.message_type == message::DELETE_ROSPEC_RESPONSE => {
        self.on_delete_rospec_response(frame)
      }

      SessionState::AwaitingDeleteAck if frame.message_type == message::ADD_ROSPEC_RESPONSE => {
        self.on_status_gated_response(frame, |c| {
          c.state = SessionState::AwaitingAddAck;
          vec![c.send(message::ENABLE_ROSPEC, ROSPEC_ID.to_be_bytes().to_vec())]
        })
      }

      SessionState::AwaitingAddAck if frame.message_type == message::ENABLE_ROSPEC_RESPONSE => {
        self.on_status_gated_response(frame, |c| {
          c.state = SessionState::AwaitingEnableAck;
          vec![c.send(message::START_ROSPEC, ROSPEC_ID.to_be_bytes().to_vec())]
        })
      }

      SessionState::AwaitingEnableAck if frame.message_type == message::START_ROSPEC_RESPONSE => {
        self.on_status_gated_response(frame, |c| {
          c.rospec_started = true;
          c.state = SessionState::AwaitingStartAck;
          vec![Intent::Emit(SessionEvent::Ready)]
        })
      }

      _ => {
        warn!(
          "unexpected message type {} in state {:?}",
          frame.message_type, self.state
        );
        vec![]
      }
    }
  }

  fn on_ro_access_report(&mut self, frame: &Frame) -> Vec<Intent> {
    // Buffered-tag guard (spec.md §4.6, Property 6): reports arriving
    // before the ROSpec is confirmed started MUST be dropped.
    if !self.rospec_started {
      debug!("dropping RO_ACCESS_REPORT received before ROSpec start");
      return vec![];
    }

    if self.state == SessionState::AwaitingStartAck {
      self.state = SessionState::Running;
    }

    let sole_antenna = if self.config.antennas.len() == 1 {
      self.config.antennas.iter().next().copied()
    } else {
      None
    };

    parse_ro_access_report(&frame.payload, sole_antenna)
      .into_iter()
      .map(|obs| Intent::Emit(SessionEvent::Tag(obs)))
      .collect()
  }

  fn on_capabilities_response(&mut self, frame: &Frame) -> Vec<Intent> {
    match parse_capabilities(&frame.payload) {
      Ok(caps) => {
        self.capabilities = caps;
        self.antenna_plans = resolve_antenna_plans(
          &self.config.antennas,
          &self.config.power_dbm,
          &self.capabilities.power_table,
        );
        if self.capabilities.power_table.is_empty() {
          warn!("no transmit power table advertised; falling back to clamped dBm as index");
        }
        if self.capabilities.hop_table_ids.is_empty() {
          warn!("no frequency hop table advertised; falling back to hop table ID 1");
        }

        self.state = SessionState::AwaitingCapabilities;
        vec![self.send(message::DELETE_ROSPEC, 0u32.to_be_bytes().to_vec())]
      }

      Err(LlrpError::CapabilitiesRejected(code)) => self.abort(LlrpError::CapabilitiesRejected(code)),

      Err(e) => self.abort(e),
    }
  }

  fn on_delete_rospec_response(&mut self, frame: &Frame) -> Vec<Intent> {
    self.on_status_gated_response(frame, |c| {
      c.state = SessionState::AwaitingDeleteAck;
      let body = build_rospec(&c.antenna_plans, c.capabilities.hop_table_ids.selected());
      vec![c.send(message::ADD_ROSPEC, body)]
    })
  }

  /// Every startup-chain response carries a leading `LLRPStatus` (TLV
  /// 287, spec.md §4.6). A non-zero status code aborts the session;
  /// otherwise `on_success` runs to compute the next transition/intents.
  fn on_status_gated_response(&mut self, frame: &Frame, on_success: impl FnOnce(&mut Self) -> Vec<Intent>) -> Vec<Intent> {
    match parse_status(&frame.payload) {
      Ok(Some((0, _))) | Ok(None) => on_success(self),
      Ok(Some((code, description))) => self.abort(LlrpError::LlrpStatus { code, description }),
      Err(e) => self.abort(e),
    }
  }

  /// Tears down in-memory session state and decides whether to schedule
  /// a reconnect, per `enable_reconnect` (spec.md §4.6). Used both for
  /// controller-detected failures (bad status codes, malformed
  /// capabilities) and for socket-level failures the I/O layer detects.
  pub fn abort(&mut self, err: LlrpError) -> Vec<Intent> {
    warn!("session aborted: {err}");
    // A disconnect already in progress must end the session outright;
    // the reconnect loop is suppressed while ShuttingDown, regardless of
    // enable_reconnect (spec.md §4.6).
    let shutting_down = self.state == SessionState::ShuttingDown;
    self.reset_runtime_state();
    self.state = SessionState::Disconnected;

    let mut intents = vec![
      Intent::Emit(SessionEvent::Disconnected),
      Intent::Emit(SessionEvent::Error(err.to_string())),
      Intent::CloseSocket,
    ];

    if self.config.enable_reconnect && !shutting_down {
      intents.push(Intent::ScheduleReconnect {
        delay: Duration::from_millis(self.config.reconnect_interval_ms as u64),
      });
    } else {
      intents.push(Intent::End);
    }

    intents
  }
}

/// Parses the leading `LLRPStatus`(287) of a response body, if present.
/// Field/Parameter errors nested inside it are logged verbatim as the
/// diagnostic channel (spec.md §4.6) but don't change the abort decision
/// beyond the status code itself.
fn parse_status(body: &[u8]) -> Result<Option<(u16, String)>, LlrpError> {
  let top = decode_parameters(body, 0, body.len(), false)?;

  let Some(Parameter::Tlv { param_type, body: range }) = top.first() else {
    return Ok(None);
  };
  if *param_type != param::LLRP_STATUS {
    return Ok(None);
  }

  let value = &body[range.clone()][4..];
  if value.len() < 4 {
    return Err(LlrpError::CapabilitiesMalformed("LLRPStatus too short".into()));
  }

  let code = u16::from_be_bytes([value[0], value[1]]);
  let desc_len = u16::from_be_bytes([value[2], value[3]]) as usize;
  let description = if value.len() >= 4 + desc_len {
    String::from_utf8_lossy(&value[4..4 + desc_len]).into_owned()
  } else {
    String::new()
  };

  let sub_lo = range.start + 4 + 4 + desc_len;
  if sub_lo < range.end {
    for sub in decode_parameters(body, sub_lo, range.end, false).unwrap_or_default() {
      if let Parameter::Tlv { param_type, body: sub_range } = sub {
        if param_type == param::FIELD_ERROR || param_type == param::PARAMETER_ERROR {
          warn!("LLRPStatus diagnostic sub-parameter {}: {:02x?}", param_type, &body[sub_range]);
        }
      }
    }
  }

  Ok(Some((code, description)))
}
