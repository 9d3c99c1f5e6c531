// Motor backend abstraction and backend selection
//
// Both wheels always share one backend type: a pair is either
// MotorPair<PhysicalBackend> or MotorPair<SimulatedBackend>, never mixed.

use std::fmt;

use tracing::{info, warn};

use super::feetech::FeetechError;
use super::kinematics::{MotorEffort, WheelEfforts};
use super::physical::{HardwareCapability, PhysicalBackend};
use super::simulated::SimulatedBackend;
use crate::config::ServoConfig;
use crate::error::Result;

/// The four operations every motor backend provides
pub trait MotorBackend {
    fn drive_forward(&mut self, speed: f32) -> Result<()>;

    fn drive_backward(&mut self, speed: f32) -> Result<()>;

    fn halt(&mut self) -> Result<()>;

    /// Let go of the hardware; the motor must not be driven afterwards
    fn release(&mut self) -> Result<()>;

    fn apply(&mut self, effort: MotorEffort) -> Result<()> {
        match effort {
            MotorEffort::Forward(speed) => self.drive_forward(speed),
            MotorEffort::Backward(speed) => self.drive_backward(speed),
            MotorEffort::Halted => self.halt(),
            MotorEffort::Released => self.release(),
        }
    }
}

/// Left and right motor bound to the same backend type
#[derive(Debug)]
pub struct MotorPair<B> {
    pub left: B,
    pub right: B,
}

impl<B: MotorBackend> MotorPair<B> {
    pub fn new(left: B, right: B) -> Self {
        Self { left, right }
    }

    /// Apply both efforts; the right motor is still driven if the left one fails
    pub fn apply(&mut self, efforts: WheelEfforts) -> Result<()> {
        let left = self.left.apply(efforts.left);
        let right = self.right.apply(efforts.right);
        left.and(right)
    }
}

impl MotorPair<SimulatedBackend> {
    pub fn simulated() -> Self {
        Self::new(SimulatedBackend::new("left"), SimulatedBackend::new("right"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Physical,
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Physical => f.write_str("physical"),
            BackendKind::Simulated => f.write_str("simulated"),
        }
    }
}

/// The motor pair chosen at startup
#[derive(Debug)]
pub enum BackendPair {
    Physical(MotorPair<PhysicalBackend>),
    Simulated(MotorPair<SimulatedBackend>),
}

impl BackendPair {
    /// Pick the backend from the probe result, opening the servo bus when
    /// the hardware looks available.
    pub fn select(capability: HardwareCapability) -> Self {
        Self::select_with(capability, PhysicalBackend::open_pair)
    }

    /// Like [`BackendPair::select`] with a custom physical constructor.
    ///
    /// Any constructor failure falls back to simulated motors on both sides.
    pub fn select_with<F>(capability: HardwareCapability, open: F) -> Self
    where
        F: FnOnce(&ServoConfig) -> std::result::Result<MotorPair<PhysicalBackend>, FeetechError>,
    {
        match capability {
            HardwareCapability::Available(servo) => match open(&servo) {
                Ok(pair) => {
                    info!(
                        "Using servo motors on {} (left={}, right={})",
                        servo.port, servo.left_id, servo.right_id
                    );
                    BackendPair::Physical(pair)
                }
                Err(e) => {
                    warn!(
                        "Failed to initialize servo motors ({}). Falling back to simulated motors",
                        e
                    );
                    BackendPair::Simulated(MotorPair::simulated())
                }
            },
            HardwareCapability::Unavailable(reason) => {
                warn!(
                    "Motor hardware not available ({}). Running simulated motors, nothing will move",
                    reason
                );
                BackendPair::Simulated(MotorPair::simulated())
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendPair::Physical(_) => BackendKind::Physical,
            BackendPair::Simulated(_) => BackendKind::Simulated,
        }
    }

    pub fn apply(&mut self, efforts: WheelEfforts) -> Result<()> {
        match self {
            BackendPair::Physical(pair) => pair.apply(efforts),
            BackendPair::Simulated(pair) => pair.apply(efforts),
        }
    }

    pub fn left(&mut self) -> &mut dyn MotorBackend {
        match self {
            BackendPair::Physical(pair) => &mut pair.left,
            BackendPair::Simulated(pair) => &mut pair.left,
        }
    }

    pub fn right(&mut self) -> &mut dyn MotorBackend {
        match self {
            BackendPair::Physical(pair) => &mut pair.right,
            BackendPair::Simulated(pair) => &mut pair.right,
        }
    }

    /// The simulated pair, if that's what is bound
    pub fn simulated(&self) -> Option<&MotorPair<SimulatedBackend>> {
        match self {
            BackendPair::Simulated(pair) => Some(pair),
            BackendPair::Physical(_) => None,
        }
    }
}
