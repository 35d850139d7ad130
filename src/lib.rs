//! An LLRP client for Zebra FX9600-family UHF RFID readers.
//!
//! [`Session::connect`] drives the full startup handshake (capabilities,
//! ROSpec teardown/build/enable/start) and then forwards decoded tag
//! reports as [`SessionEvent`]s until [`Session::disconnect`] is called
//! or the reader goes away.

pub mod capabilities;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod params;
pub mod rospec;
pub mod session;
pub mod tags;
pub mod types;

pub use config::{load_config, SessionConfig};
pub use controller::SessionEvent;
pub use error::{LlrpError, LlrpResult};
pub use session::Session;
pub use tags::TagObservation;
