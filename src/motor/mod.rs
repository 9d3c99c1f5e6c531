// Motor control for the differential-drive base
//
// Provides:
// - Action -> per-wheel effort mapping
// - Physical (Feetech bus servo) and simulated motor backends
// - Capability probe and one-time backend selection
// - High-level motor driver with drive state

mod backend;
mod driver;
pub mod feetech;
pub mod kinematics;
mod physical;
mod simulated;

pub use backend::{BackendKind, BackendPair, MotorBackend, MotorPair};
pub use driver::{ActuatorState, DriveSettings, DriveState, MotorDriver, Orientation};
pub use feetech::{FeetechBus, FeetechError};
pub use kinematics::{MotorEffort, WheelEfforts, action_to_wheels};
pub use physical::{HardwareCapability, PhysicalBackend, probe_hardware};
pub use simulated::SimulatedBackend;
