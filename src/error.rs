// Crate-wide error type

use crate::motor::FeetechError;
use crate::sensor::LidarError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Servo bus error: {0}")]
    Servo(#[from] FeetechError),

    #[error("Lidar error: {0}")]
    Lidar(#[from] LidarError),

    #[error("Error setting Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
