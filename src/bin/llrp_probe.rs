//! Demo CLI: connects to a reader, logs the event stream, and stops on
//! Ctrl-C. Grounded on the teacher's `main.rs` one-shot command
//! sequence, rebuilt against the long-lived `Session` event-stream API.

use std::collections::{BTreeMap, BTreeSet};
use std::env;

use log::{error, info, warn};

use fx9600_llrp::{load_config, Session, SessionConfig, SessionEvent};

#[tokio::main]
async fn main() {
  env_logger::init();

  let config_path = env::args().nth(1);
  let config = match config_path {
    Some(path) => match load_config(&path) {
      Ok(config) => config,
      Err(e) => {
        error!("failed to load config {path}: {e}");
        default_config()
      }
    },
    None => {
      warn!("no config path given; using defaults (127.0.0.1:5084, antenna 1)");
      default_config()
    }
  };

  info!("connecting to {}:{}", config.host, config.port);
  let (session, mut events) = Session::connect(config);

  tokio::select! {
    _ = tokio::signal::ctrl_c() => {
      info!("Ctrl-C received, disconnecting");
      session.disconnect();
    }
    _ = drain_events(&mut events) => {}
  }

  // Give the session a moment to finish the shutdown handshake and emit
  // its final Disconnected event.
  while let Some(event) = events.recv().await {
    log_event(&event);
    if matches!(event, SessionEvent::Disconnected) {
      break;
    }
  }
}

async fn drain_events(events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
  while let Some(event) = events.recv().await {
    log_event(&event);
  }
}

fn log_event(event: &SessionEvent) {
  match event {
    SessionEvent::Connected => info!("connected"),
    SessionEvent::Ready => info!("ROSpec running, awaiting tags"),
    SessionEvent::Tag(obs) => info!(
      "tag epc={:02x?} antenna={:?} rssi={:?} seen_count={:?} last_seen={}",
      obs.epc,
      obs.antenna,
      obs.rssi,
      obs.seen_count,
      obs
        .last_seen_utc_micros
        .and_then(|us| chrono::DateTime::from_timestamp_micros(us as i64))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
    ),
    SessionEvent::Disconnected => info!("disconnected"),
    SessionEvent::Error(msg) => error!("session error: {msg}"),
  }
}

fn default_config() -> SessionConfig {
  let mut antennas = BTreeSet::new();
  antennas.insert(1u16);
  SessionConfig {
    host: "127.0.0.1".into(),
    port: 5084,
    antennas,
    power_dbm: BTreeMap::new(),
    reconnect_interval_ms: 2000,
    enable_reconnect: true,
  }
}
