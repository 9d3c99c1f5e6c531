// Defaults, timeouts, and the shared startup configuration file
//
// Every value can come from three places, in increasing priority:
// the constants below, the optional JSON config file, and command line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Network topology
pub const ACTUATOR_PORT: u16 = 5000;
pub const DECISION_PORT: u16 = 6000;
pub const LISTEN_HOST: &str = "0.0.0.0";
pub const CONNECT_HOST: &str = "127.0.0.1";

// Socket read timeout, bounds how long a loop waits before re-checking cancellation
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

// How often a pending accept re-checks cancellation
pub const ACCEPT_POLL: Duration = Duration::from_millis(50);

// Obstacle classification
pub const OBSTACLE_THRESHOLD_MM: f64 = 400.0;

// Drive behaviour
pub const DEFAULT_SPEED: f32 = 0.5;
pub const TURN_FACTOR: f32 = 0.6;

// Lidar (RPLidar A1 on USB serial)
pub const LIDAR_PORT: &str = "/dev/ttyUSB0";
pub const LIDAR_BAUDRATE: u32 = 115_200;
pub const LIDAR_PWM: u16 = 500;
pub const LIDAR_MAX_BUF_MEAS: usize = 300;

// Pause between scan batches so the lidar driver's input buffer can't run away
pub const SCAN_THROTTLE: Duration = Duration::from_millis(50);

// Wheel servos (Feetech STS bus)
pub const SERVO_PORT: &str = "/dev/ttyACM0";
pub const SERVO_BAUDRATE: u32 = 1_000_000;
pub const LEFT_MOTOR_ID: u8 = 1;
pub const RIGHT_MOTOR_ID: u8 = 2;
pub const MAX_RAW_VELOCITY: i16 = 3000;

/// Contents of the optional `--config` JSON file. Missing sections and
/// fields fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub decision: DecisionConfig,
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Decision engine host to connect to
    pub connect_host: String,
    pub connect_port: u16,
    pub lidar_port: String,
    pub lidar_baudrate: u32,
    pub lidar_pwm: u16,
    pub max_buf_meas: usize,
    pub scan_throttle_ms: u64,
    /// Replay recorded scans from this file instead of opening the lidar
    pub replay: Option<PathBuf>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            connect_host: CONNECT_HOST.to_string(),
            connect_port: DECISION_PORT,
            lidar_port: LIDAR_PORT.to_string(),
            lidar_baudrate: LIDAR_BAUDRATE,
            lidar_pwm: LIDAR_PWM,
            max_buf_meas: LIDAR_MAX_BUF_MEAS,
            scan_throttle_ms: SCAN_THROTTLE.as_millis() as u64,
            replay: None,
        }
    }
}

impl SensorConfig {
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.connect_host, self.connect_port)
    }

    pub fn scan_throttle(&self) -> Duration {
        Duration::from_millis(self.scan_throttle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Where the sensor streamer connects
    pub listen_host: String,
    pub listen_port: u16,
    /// Where the motor actuator listens
    pub connect_host: String,
    pub connect_port: u16,
    pub obstacle_threshold_mm: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            listen_host: LISTEN_HOST.to_string(),
            listen_port: DECISION_PORT,
            connect_host: CONNECT_HOST.to_string(),
            connect_port: ACTUATOR_PORT,
            obstacle_threshold_mm: OBSTACLE_THRESHOLD_MM,
        }
    }
}

impl DecisionConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.connect_host, self.connect_port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub default_speed: f32,
    pub turn_factor: f32,
    /// Skip the hardware probe and drive simulated motors
    pub simulate: bool,
    pub servo: ServoConfig,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            listen_host: LISTEN_HOST.to_string(),
            listen_port: ACTUATOR_PORT,
            default_speed: DEFAULT_SPEED,
            turn_factor: TURN_FACTOR,
            simulate: false,
            servo: ServoConfig::default(),
        }
    }
}

impl ActuatorConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

/// Serial bus and wheel servo layout for the physical backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub port: String,
    pub baudrate: u32,
    pub left_id: u8,
    pub right_id: u8,
    /// Raw goal velocity written for speed 1.0
    pub max_raw_velocity: i16,
    /// The right wheel is mounted mirrored, so "forward" is a negative velocity
    pub invert_right: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            port: SERVO_PORT.to_string(),
            baudrate: SERVO_BAUDRATE,
            left_id: LEFT_MOTOR_ID,
            right_id: RIGHT_MOTOR_ID,
            max_raw_velocity: MAX_RAW_VELOCITY,
            invert_right: true,
        }
    }
}

impl Config {
    /// Load the config file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_json(&text)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_topology() {
        let config = Config::default();
        assert_eq!(config.sensor.connect_addr(), "127.0.0.1:6000");
        assert_eq!(config.decision.listen_addr(), "0.0.0.0:6000");
        assert_eq!(config.decision.connect_addr(), "127.0.0.1:5000");
        assert_eq!(config.actuator.listen_addr(), "0.0.0.0:5000");
        assert_eq!(config.decision.obstacle_threshold_mm, 400.0);
        assert_eq!(config.actuator.default_speed, 0.5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{ "decision": { "obstacle_threshold_mm": 250 }, "actuator": { "servo": { "left_id": 7 } } }"#,
        )
        .unwrap();

        assert_eq!(config.decision.obstacle_threshold_mm, 250.0);
        assert_eq!(config.decision.listen_port, DECISION_PORT);
        assert_eq!(config.actuator.servo.left_id, 7);
        assert_eq!(config.actuator.servo.right_id, RIGHT_MOTOR_ID);
        assert_eq!(config.sensor, SensorConfig::default());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(Config::from_json("{ not json").is_err());
    }

    #[test]
    fn test_demo_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/robot.json");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/robot.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
