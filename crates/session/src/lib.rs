//! Session Manager: owns the simulator connection and the world configuration
//! it checks out for the lifetime of a session.
//!
//! # Invariants
//! - Weather is applied before the baseline settings are captured.
//! - Synchronous mode (traffic control first, then world settings) is the last
//!   configuration step of `open`.
//! - `close` turns synchronous mode off, clears the fixed timestep and
//!   disables traffic synchronous mode, whether or not anything was ever
//!   spawned, leaving the shared simulator in real-time mode.
//! - A closed session rejects every further simulator call.

pub mod config;
mod session;

pub use config::{CameraMount, ConfigError, MapSource, SessionConfig};
pub use session::{Session, SessionError, SettingsLease};
