//! Lidar-driven obstacle avoidance for a two-wheel robot.
//!
//! Three processes talk over newline-delimited TCP streams:
//!
//! ```text
//! sensor-streamer --"angle,distance"--> decision-engine --"command"--> motor-actuator
//! ```
//!
//! Each process runs one blocking loop and shuts down cleanly on Ctrl-C,
//! end of input, or loss of its peer.

pub mod actuator;
pub mod cleanup;
pub mod config;
pub mod decision;
pub mod error;
pub mod messages;
pub mod motor;
pub mod net;
pub mod sensor;
pub mod signal;

pub use error::{Error, Result};

/// Install the fmt subscriber used by every binary.
/// Defaults to `info`; RUST_LOG overrides (e.g. RUST_LOG=debug).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
