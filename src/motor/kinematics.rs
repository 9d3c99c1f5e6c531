// Differential-drive mapping for the two-wheel base
// Converts a discrete action into per-wheel efforts, and efforts into raw servo velocities.

use crate::messages::Action;

/// What a single motor is asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MotorEffort {
    /// Speed in [0, 1]
    Forward(f32),
    Backward(f32),
    Halted,
    #[default]
    Released,
}

/// Effort for the left and right motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEfforts {
    pub left: MotorEffort,
    pub right: MotorEffort,
}

impl WheelEfforts {
    pub fn new(left: MotorEffort, right: MotorEffort) -> Self {
        Self { left, right }
    }

    pub fn halted() -> Self {
        Self::new(MotorEffort::Halted, MotorEffort::Halted)
    }
}

/// Map an action to wheel efforts
///
/// Turns spin the outer wheel forward at full speed and the inner wheel
/// backward at `speed * turn_factor`. `Shutdown` maps to a halt; releasing
/// the motors afterwards is up to the caller.
pub fn action_to_wheels(action: Action, speed: f32, turn_factor: f32) -> WheelEfforts {
    let inner = speed * turn_factor;

    match action {
        Action::Forward => {
            WheelEfforts::new(MotorEffort::Forward(speed), MotorEffort::Forward(speed))
        }
        Action::Backward => {
            WheelEfforts::new(MotorEffort::Backward(speed), MotorEffort::Backward(speed))
        }
        Action::TurnLeft => {
            WheelEfforts::new(MotorEffort::Backward(inner), MotorEffort::Forward(speed))
        }
        Action::TurnRight => {
            WheelEfforts::new(MotorEffort::Forward(speed), MotorEffort::Backward(inner))
        }
        Action::Stop | Action::Shutdown => WheelEfforts::halted(),
    }
}

/// Convert a [0, 1] speed into a raw signed servo velocity
///
/// `reverse` flips the sign, `max_raw` is the raw value for full speed.
pub fn speed_to_raw(speed: f32, reverse: bool, max_raw: i16) -> i16 {
    let magnitude = (speed.clamp(0.0, 1.0) * max_raw as f32).round() as i32;
    let signed = if reverse { -magnitude } else { magnitude };

    // Clamp to signed 16-bit range
    signed.clamp(-0x7FFF, 0x7FFF) as i16
}
