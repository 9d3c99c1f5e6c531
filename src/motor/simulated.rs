// Stand-in motor used when the servo bus isn't there
//
// Records what it was asked to do and reports it through tracing.

use std::collections::VecDeque;

use tracing::info;

use super::backend::MotorBackend;
use super::kinematics::MotorEffort;
use crate::error::Result;

/// How many past efforts each simulated motor remembers
pub const HISTORY_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    name: &'static str,
    effort: MotorEffort,
    history: VecDeque<MotorEffort>,
}

impl SimulatedBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            effort: MotorEffort::default(),
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Last requested effort
    pub fn effort(&self) -> MotorEffort {
        self.effort
    }

    /// Recent efforts, oldest first
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &MotorEffort> {
        self.history.iter()
    }

    pub fn halt_count(&self) -> usize {
        self.history
            .iter()
            .filter(|effort| **effort == MotorEffort::Halted)
            .count()
    }

    fn record(&mut self, effort: MotorEffort) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(effort);
        self.effort = effort;
    }
}

impl MotorBackend for SimulatedBackend {
    fn drive_forward(&mut self, speed: f32) -> Result<()> {
        info!("[SIM] {} motor forward at speed {:.2}", self.name, speed);
        self.record(MotorEffort::Forward(speed));
        Ok(())
    }

    fn drive_backward(&mut self, speed: f32) -> Result<()> {
        info!("[SIM] {} motor backward at speed {:.2}", self.name, speed);
        self.record(MotorEffort::Backward(speed));
        Ok(())
    }

    fn halt(&mut self) -> Result<()> {
        info!("[SIM] {} motor stopped", self.name);
        self.record(MotorEffort::Halted);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        info!("[SIM] {} motor released", self.name);
        self.record(MotorEffort::Released);
        Ok(())
    }
}
