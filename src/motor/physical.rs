// Wheel motors driven through Feetech bus servos in velocity mode
//
// Both wheels hang off one serial bus, so the two backends share it.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};

use super::backend::{MotorBackend, MotorPair};
use super::feetech::{self, FeetechBus, FeetechError, OperatingMode};
use super::kinematics::speed_to_raw;
use crate::config::{ActuatorConfig, ServoConfig};
use crate::error::Result;

/// Result of probing for motor hardware at startup
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCapability {
    /// Worth trying to open the servo bus with this layout
    Available(ServoConfig),
    /// Don't bother, with the reason why
    Unavailable(String),
}

/// Decide whether physical motors should be attempted
pub fn probe_hardware(config: &ActuatorConfig) -> HardwareCapability {
    if config.simulate {
        return HardwareCapability::Unavailable("simulation requested".to_string());
    }

    if !Path::new(&config.servo.port).exists() {
        return HardwareCapability::Unavailable(format!(
            "servo port {} not found",
            config.servo.port
        ));
    }

    HardwareCapability::Available(config.servo.clone())
}

pub struct PhysicalBackend {
    bus: Rc<RefCell<FeetechBus>>,
    id: u8,
    max_raw: i16,
    /// Mirrored mounting: forward is a negative velocity
    inverted: bool,
}

impl fmt::Debug for PhysicalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalBackend")
            .field("id", &self.id)
            .field("max_raw", &self.max_raw)
            .field("inverted", &self.inverted)
            .finish()
    }
}

impl PhysicalBackend {
    /// Open the servo bus and bring both wheel servos up in velocity mode
    pub fn open_pair(config: &ServoConfig) -> feetech::Result<MotorPair<PhysicalBackend>> {
        info!("Opening motor bus on {}", config.port);
        let bus = FeetechBus::open(&config.port, config.baudrate)?;
        Self::pair_on(bus, config)
    }

    /// Bring up both wheel servos on an already open bus
    ///
    /// Checks that both motors answer, then disables torque, sets velocity
    /// mode and re-enables torque.
    pub fn pair_on(
        mut bus: FeetechBus,
        config: &ServoConfig,
    ) -> feetech::Result<MotorPair<PhysicalBackend>> {
        let ids = [config.left_id, config.right_id];

        for id in ids {
            if !bus.ping(id)? {
                return Err(FeetechError::Timeout { id });
            }
            debug!("Motor {} responding", id);
        }

        for id in ids {
            bus.disable_torque(id)?;
            bus.set_operating_mode(id, OperatingMode::Velocity)?;
            bus.enable_torque(id)?;
        }

        info!("Wheel servos {:?} initialized for velocity control", ids);

        let bus = Rc::new(RefCell::new(bus));
        Ok(MotorPair::new(
            PhysicalBackend {
                bus: Rc::clone(&bus),
                id: config.left_id,
                max_raw: config.max_raw_velocity,
                inverted: false,
            },
            PhysicalBackend {
                bus,
                id: config.right_id,
                max_raw: config.max_raw_velocity,
                inverted: config.invert_right,
            },
        ))
    }

    fn set_velocity(&mut self, speed: f32, backward: bool) -> Result<()> {
        let raw = speed_to_raw(speed, backward != self.inverted, self.max_raw);
        debug!("Motor {} goal velocity {}", self.id, raw);
        self.bus.borrow_mut().set_velocity(self.id, raw)?;
        Ok(())
    }
}

impl MotorBackend for PhysicalBackend {
    fn drive_forward(&mut self, speed: f32) -> Result<()> {
        self.set_velocity(speed, false)
    }

    fn drive_backward(&mut self, speed: f32) -> Result<()> {
        self.set_velocity(speed, true)
    }

    fn halt(&mut self) -> Result<()> {
        self.bus.borrow_mut().set_velocity(self.id, 0)?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        bus.set_velocity(self.id, 0)?;
        bus.disable_torque(self.id)?;
        Ok(())
    }
}
