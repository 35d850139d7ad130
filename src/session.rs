//! Async session driver (spec.md §4.6, §5, §6).
//!
//! Wraps the pure [`Controller`](crate::controller::Controller) with a
//! tokio event loop: it owns the socket and the receive buffer, applies
//! the `Intent`s the controller returns, and feeds back frames, timer
//! fires, and consumer commands. Grounded on the teacher's
//! `client.rs`/`main.rs` socket loop (`TcpStream::connect`,
//! `read_buf`-until-complete, `write_all`), generalised from a one-shot
//! command sequence into a long-lived, reconnecting event loop.

use std::time::Duration;

use bytes::BytesMut;
use log::{error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::config::SessionConfig;
use crate::controller::{Controller, Intent, SessionEvent, SessionState, TimerKind};
use crate::error::LlrpError;
use crate::frame::{decode_frame, encode_frame};

/// Spec-mandated TCP read timeout while the startup handshake is in
/// flight (spec.md §4.6, §5). Cleared once `Ready` is reached and
/// liveness is inferred from KEEPALIVE traffic instead.
const CONNECT_READ_TIMEOUT: Duration = Duration::from_secs(30);

enum Command {
  Disconnect,
  Reconfigure {
    antennas: std::collections::BTreeSet<u16>,
    power_dbm: std::collections::BTreeMap<u16, f32>,
  },
}

/// Handle to a running LLRP session. Dropping it does not disconnect;
/// call [`Session::disconnect`] explicitly, then wait for a
/// [`SessionEvent::Disconnected`] on the event channel.
pub struct Session {
  cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Session {
  /// Spawns the session's background task and returns a handle plus the
  /// event stream the consumer should drain (spec.md §6).
  pub fn connect(config: SessionConfig) -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(config, cmd_rx, event_tx));
    (Session { cmd_tx }, event_rx)
  }

  pub fn disconnect(&self) {
    let _ = self.cmd_tx.send(Command::Disconnect);
  }

  /// Applies a new antenna/power configuration by tearing down and
  /// immediately reconnecting, bypassing `reconnect_interval_ms` and
  /// `enable_reconnect` (SPEC_FULL §6.2).
  pub fn reconfigure(&self, antennas: std::collections::BTreeSet<u16>, power_dbm: std::collections::BTreeMap<u16, f32>) {
    let _ = self.cmd_tx.send(Command::Reconfigure { antennas, power_dbm });
  }
}

async fn run(config: SessionConfig, mut cmd_rx: mpsc::UnboundedReceiver<Command>, event_tx: mpsc::UnboundedSender<SessionEvent>) {
  let mut controller = Controller::new(config);
  let mut ended = false;

  while !ended {
    let addr = (controller.config.host.clone(), controller.config.port);
    info!("connecting to {}:{}", addr.0, addr.1);

    let socket = match TcpStream::connect(addr).await {
      Ok(s) => s,
      Err(e) => {
        warn!("connect failed: {e}");
        emit(&event_tx, SessionEvent::Error(e.to_string()));
        if !controller.config.enable_reconnect {
          break;
        }
        sleep(Duration::from_millis(controller.config.reconnect_interval_ms as u64)).await;
        continue;
      }
    };

    match drive_session(&mut controller, socket, &mut cmd_rx, &event_tx).await {
      Outcome::Reconnect { delay } => {
        sleep(delay).await;
        continue;
      }
      Outcome::End => {
        ended = true;
      }
    }
  }
}

enum Outcome {
  Reconnect { delay: Duration },
  End,
}

/// Reads into `recv_buf`, applying the 30-second connect-phase timeout
/// (spec.md §4.6, §5) only while `apply_timeout` is set. Returns `None`
/// on timeout elapse, otherwise the underlying read's result.
async fn read_with_startup_timeout(
  socket: &mut TcpStream,
  recv_buf: &mut BytesMut,
  apply_timeout: bool,
) -> Option<std::io::Result<usize>> {
  if apply_timeout {
    timeout(CONNECT_READ_TIMEOUT, socket.read_buf(recv_buf)).await.ok()
  } else {
    Some(socket.read_buf(recv_buf).await)
  }
}

/// Drives one TCP connection to completion: applies the controller's
/// startup intents, then loops reading frames, firing timers, and
/// forwarding consumer commands until the controller calls for a
/// reconnect or the session ends.
async fn drive_session(
  controller: &mut Controller,
  mut socket: TcpStream,
  cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
  event_tx: &mpsc::UnboundedSender<SessionEvent>,
) -> Outcome {
  let mut recv_buf = BytesMut::with_capacity(4096);
  let mut pending_timer: Option<(TimerKind, Duration)> = None;

  if let Some(outcome) = apply_intents(controller.on_tcp_connected(), &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
    return outcome;
  }

  loop {
    let timer_sleep = async {
      match pending_timer {
        Some((_, after)) => sleep(after).await,
        None => std::future::pending().await,
      }
    };

    let awaiting_startup = !matches!(controller.state, SessionState::AwaitingStartAck | SessionState::Running);

    tokio::select! {
      timed_read = read_with_startup_timeout(&mut socket, &mut recv_buf, awaiting_startup) => {
        let abort_err = match timed_read {
          None => Some(LlrpError::ConnectTimeout),
          Some(Ok(0)) => Some(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "reader closed the connection").into()),
          Some(Ok(_)) => {
            let mut frame_err = None;
            loop {
              match decode_frame(&mut recv_buf) {
                Ok(Some(frame)) => {
                  let intents = controller.on_frame(&frame);
                  if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
                    return outcome;
                  }
                }
                Ok(None) => break,
                Err(e) => {
                  frame_err = Some(e);
                  break;
                }
              }
            }
            frame_err
          }
          Some(Err(e)) => Some(e.into()),
        };

        if let Some(err) = abort_err {
          error!("connection lost: {err}");
          let intents = controller.abort(err);
          if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
            return outcome;
          }
        }
      }

      _ = timer_sleep => {
        let (timer, _) = pending_timer.take().expect("timer fired without being armed");
        let intents = controller.on_timer(timer);
        if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
          return outcome;
        }
      }

      cmd = cmd_rx.recv() => {
        match cmd {
          Some(Command::Disconnect) => {
            let intents = controller.on_disconnect_requested();
            if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
              return outcome;
            }
          }
          Some(Command::Reconfigure { antennas, power_dbm }) => {
            let intents = controller.on_reconfigure(antennas, power_dbm);
            if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
              return outcome;
            }
          }
          None => {
            // Every Session handle was dropped; treat like an explicit disconnect.
            let intents = controller.on_disconnect_requested();
            if let Some(outcome) = apply_intents(intents, &mut socket, &mut pending_timer, event_tx, Duration::from_millis(controller.config.reconnect_interval_ms as u64), controller.config.enable_reconnect).await {
              return outcome;
            }
          }
        }
      }
    }
  }
}

/// Applies a batch of intents against the live socket, returning
/// `Some(Outcome)` if the connection should be torn down.
async fn apply_intents(
  intents: Vec<Intent>,
  socket: &mut TcpStream,
  pending_timer: &mut Option<(TimerKind, Duration)>,
  event_tx: &mpsc::UnboundedSender<SessionEvent>,
  reconnect_delay: Duration,
  enable_reconnect: bool,
) -> Option<Outcome> {
  for intent in intents {
    match intent {
      Intent::Send { message_type, message_id, payload } => {
        let encoded = encode_frame(message_type, message_id, &payload);
        if let Err(e) = socket.write_all(&encoded).await {
          emit(event_tx, SessionEvent::Disconnected);
          emit(event_tx, SessionEvent::Error(e.to_string()));
          return Some(if enable_reconnect {
            Outcome::Reconnect { delay: reconnect_delay }
          } else {
            Outcome::End
          });
        }
      }

      Intent::ArmTimer { timer, after } => {
        *pending_timer = Some((timer, after));
      }

      Intent::Emit(event) => emit(event_tx, event),

      Intent::CloseSocket => {
        let _ = socket.shutdown().await;
      }

      Intent::ScheduleReconnect { delay } => return Some(Outcome::Reconnect { delay }),

      Intent::End => return Some(Outcome::End),
    }
  }

  None
}

fn emit(event_tx: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
  let _ = event_tx.send(event);
}
