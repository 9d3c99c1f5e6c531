// High-level differential drive for the two-wheel base
//
// Owns the drive state and the motor pair, and turns actions into backend calls.

use tracing::{debug, info, warn};

use super::backend::{BackendKind, BackendPair};
use super::kinematics::{WheelEfforts, action_to_wheels};
use super::physical::HardwareCapability;
use crate::cleanup::{Cleanup, CleanupReport};
use crate::config::{DEFAULT_SPEED, TURN_FACTOR};
use crate::error::{Error, Result};
use crate::messages::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveState {
    /// Cruise speed in [0, 1]
    pub current_speed: f32,
    /// Direction of the last straight-line drive
    pub orientation: Orientation,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            current_speed: DEFAULT_SPEED,
            orientation: Orientation::Forward,
        }
    }
}

/// What the base is doing right now. Stays put until the next action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Idle,
    DrivingForward,
    DrivingBackward,
    Turning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveSettings {
    pub default_speed: f32,
    /// Inner wheel speed factor while turning
    pub turn_factor: f32,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_SPEED,
            turn_factor: TURN_FACTOR,
        }
    }
}

pub struct MotorDriver {
    motors: BackendPair,
    drive: DriveState,
    state: ActuatorState,
    turn_factor: f32,
    released: bool,
}

impl MotorDriver {
    /// Create a driver, picking the backend from the probe result
    pub fn new(capability: HardwareCapability, settings: DriveSettings) -> Self {
        Self::with_backends(BackendPair::select(capability), settings)
    }

    /// Create a driver on an already selected motor pair. Motors are halted.
    pub fn with_backends(motors: BackendPair, settings: DriveSettings) -> Self {
        let mut driver = Self {
            motors,
            drive: DriveState {
                current_speed: settings.default_speed.clamp(0.0, 1.0),
                orientation: Orientation::Forward,
            },
            state: ActuatorState::Idle,
            turn_factor: settings.turn_factor.clamp(0.0, 1.0),
            released: false,
        };

        info!(
            "Motor driver ready: {} backend, speed {:.2}, turn factor {:.2}",
            driver.motors.kind(),
            driver.drive.current_speed,
            driver.turn_factor
        );

        if let Err(e) = driver.motors.apply(WheelEfforts::halted()) {
            warn!("Failed to halt motors at startup: {}", e);
        }
        driver
    }

    /// Apply one action to the motors
    pub fn apply(&mut self, action: Action) -> Result<()> {
        if self.released {
            return Err(Error::Other(format!(
                "motors already released, ignoring {}",
                action
            )));
        }

        if action == Action::Shutdown {
            let report = self.release_all();
            self.state = ActuatorState::Idle;
            if !report.is_clean() {
                return Err(Error::Other(format!(
                    "motor shutdown steps failed: {:?}",
                    report.failed
                )));
            }
            return Ok(());
        }

        let efforts = action_to_wheels(action, self.drive.current_speed, self.turn_factor);
        debug!("{} -> left={:?}, right={:?}", action, efforts.left, efforts.right);

        match action {
            Action::Forward => {
                self.drive.orientation = Orientation::Forward;
                self.state = ActuatorState::DrivingForward;
            }
            Action::Backward => {
                self.drive.orientation = Orientation::Backward;
                self.state = ActuatorState::DrivingBackward;
            }
            Action::Stop => self.state = ActuatorState::Idle,
            Action::TurnLeft | Action::TurnRight => self.state = ActuatorState::Turning,
            Action::Shutdown => {}
        }

        self.motors.apply(efforts)
    }

    /// Set the cruise speed, clamped to [0, 1]
    ///
    /// A straight drive in progress picks the new speed up immediately;
    /// turning or stopped motors keep doing what they do.
    pub fn set_speed(&mut self, level: f32) -> Result<()> {
        if level.is_nan() {
            return Err(Error::Other("speed must be a number".to_string()));
        }

        self.drive.current_speed = level.clamp(0.0, 1.0);
        info!("Speed set to {:.2}", self.drive.current_speed);

        match self.state {
            ActuatorState::DrivingForward => self.apply(Action::Forward),
            ActuatorState::DrivingBackward => self.apply(Action::Backward),
            ActuatorState::Idle | ActuatorState::Turning => Ok(()),
        }
    }

    /// Halt both motors, then release both. Every step is attempted.
    fn release_all(&mut self) -> CleanupReport {
        info!("Stopping and releasing motors");
        let motors = &mut self.motors;
        let report = Cleanup::new("motors")
            .step("halt left", || motors.left().halt())
            .step("halt right", || motors.right().halt())
            .step("release left", || motors.left().release())
            .step("release right", || motors.right().release())
            .finish();
        self.released = true;
        report
    }

    pub fn drive_state(&self) -> DriveState {
        self.drive
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.motors.kind()
    }

    pub fn motors(&self) -> &BackendPair {
        &self.motors
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Never leave the wheels spinning
        if !self.released {
            if let Err(e) = self.motors.apply(WheelEfforts::halted()) {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::backend::MotorPair;
    use crate::motor::feetech::FeetechError;
    use crate::motor::kinematics::MotorEffort;
    use crate::motor::simulated::SimulatedBackend;

    fn simulated_driver() -> MotorDriver {
        MotorDriver::new(
            HardwareCapability::Unavailable("test".into()),
            DriveSettings::default(),
        )
    }

    fn sim(driver: &MotorDriver) -> &MotorPair<SimulatedBackend> {
        driver.motors().simulated().expect("simulated backend")
    }

    fn efforts(driver: &MotorDriver) -> (MotorEffort, MotorEffort) {
        let pair = sim(driver);
        (pair.left.effort(), pair.right.effort())
    }

    #[test]
    fn test_starts_idle_and_halted() {
        let driver = simulated_driver();
        assert_eq!(driver.state(), ActuatorState::Idle);
        assert_eq!(driver.drive_state(), DriveState::default());
        assert_eq!(efforts(&driver), (MotorEffort::Halted, MotorEffort::Halted));
    }

    #[test]
    fn test_action_mapping() {
        let mut driver = simulated_driver();

        driver.apply(Action::Forward).unwrap();
        assert_eq!(driver.state(), ActuatorState::DrivingForward);
        assert_eq!(
            efforts(&driver),
            (MotorEffort::Forward(0.5), MotorEffort::Forward(0.5))
        );

        driver.apply(Action::Backward).unwrap();
        assert_eq!(driver.state(), ActuatorState::DrivingBackward);
        assert_eq!(driver.drive_state().orientation, Orientation::Backward);
        assert_eq!(
            efforts(&driver),
            (MotorEffort::Backward(0.5), MotorEffort::Backward(0.5))
        );

        driver.apply(Action::TurnLeft).unwrap();
        assert_eq!(driver.state(), ActuatorState::Turning);
        // Turning keeps the last straight-line orientation
        assert_eq!(driver.drive_state().orientation, Orientation::Backward);
        assert_eq!(
            efforts(&driver),
            (MotorEffort::Backward(0.3), MotorEffort::Forward(0.5))
        );

        driver.apply(Action::Stop).unwrap();
        assert_eq!(driver.state(), ActuatorState::Idle);
        assert_eq!(efforts(&driver), (MotorEffort::Halted, MotorEffort::Halted));
    }

    #[test]
    fn test_turn_right_at_full_speed() {
        let mut driver = MotorDriver::new(
            HardwareCapability::Unavailable("test".into()),
            DriveSettings {
                default_speed: 1.0,
                turn_factor: 0.6,
            },
        );

        driver.apply(Action::TurnRight).unwrap();

        let (left, right) = efforts(&driver);
        assert_eq!(left, MotorEffort::Forward(1.0));
        assert!(matches!(right, MotorEffort::Backward(s) if (s - 0.6).abs() < 1e-6));
    }

    #[test]
    fn test_stop_twice_is_idempotent() {
        let mut driver = simulated_driver();
        driver.apply(Action::Forward).unwrap();
        driver.apply(Action::Stop).unwrap();
        let state = driver.drive_state();
        let halts_before = sim(&driver).left.halt_count();

        driver.apply(Action::Stop).unwrap();
        driver.apply(Action::Stop).unwrap();

        assert_eq!(driver.drive_state(), state);
        assert_eq!(driver.state(), ActuatorState::Idle);
        assert_eq!(sim(&driver).left.halt_count(), halts_before + 2);
        assert_eq!(sim(&driver).right.halt_count(), halts_before + 2);
    }

    #[test]
    fn test_forced_physical_failure_still_drives() {
        let motors = BackendPair::select_with(
            HardwareCapability::Available(Default::default()),
            |_| Err(FeetechError::Timeout { id: 1 }),
        );
        let mut driver = MotorDriver::with_backends(motors, DriveSettings::default());

        assert_eq!(driver.backend_kind(), BackendKind::Simulated);
        for action in [
            Action::Forward,
            Action::TurnLeft,
            Action::TurnRight,
            Action::Backward,
            Action::Stop,
        ] {
            driver.apply(action).unwrap();
        }
        assert_eq!(efforts(&driver), (MotorEffort::Halted, MotorEffort::Halted));
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut driver = simulated_driver();
        driver.set_speed(1.7).unwrap();
        assert_eq!(driver.drive_state().current_speed, 1.0);
        driver.set_speed(-0.2).unwrap();
        assert_eq!(driver.drive_state().current_speed, 0.0);
        assert!(driver.set_speed(f32::NAN).is_err());
    }

    #[test]
    fn test_set_speed_reapplies_straight_drive_only() {
        let mut driver = simulated_driver();

        driver.set_speed(0.8).unwrap();
        assert_eq!(driver.state(), ActuatorState::Idle);
        assert_eq!(efforts(&driver), (MotorEffort::Halted, MotorEffort::Halted));

        driver.apply(Action::Backward).unwrap();
        driver.set_speed(0.4).unwrap();
        assert_eq!(
            efforts(&driver),
            (MotorEffort::Backward(0.4), MotorEffort::Backward(0.4))
        );
    }

    #[test]
    fn test_shutdown_halts_then_releases() {
        let mut driver = simulated_driver();
        driver.apply(Action::Forward).unwrap();
        driver.apply(Action::Shutdown).unwrap();

        assert!(driver.is_released());
        for motor in [&sim(&driver).left, &sim(&driver).right] {
            let tail: Vec<_> = motor.history().rev().take(2).copied().collect();
            assert_eq!(tail, vec![MotorEffort::Released, MotorEffort::Halted]);
        }

        // Nothing drives released motors
        assert!(driver.apply(Action::Forward).is_err());
        assert_eq!(efforts(&driver), (MotorEffort::Released, MotorEffort::Released));
    }

    #[test]
    fn test_default_speed_is_clamped() {
        let driver = MotorDriver::new(
            HardwareCapability::Unavailable("test".into()),
            DriveSettings {
                default_speed: 3.0,
                turn_factor: 0.6,
            },
        );
        assert_eq!(driver.drive_state().current_speed, 1.0);
    }
}
