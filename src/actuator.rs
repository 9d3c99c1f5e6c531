// Motor actuator command loop
//
// Accepts one decision engine connection and applies every command it sends
// to the motor driver until told to exit, the peer goes away, or Ctrl-C.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::cleanup::Cleanup;
use crate::config::{ACCEPT_POLL, READ_TIMEOUT};
use crate::error::Result;
use crate::messages::{Action, ActuatorCommand};
use crate::motor::MotorDriver;
use crate::net::{LineReader, ReadLine, accept_one};

/// Why the command loop ended. All of them are an orderly shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorExit {
    /// Received `exit`
    Commanded,
    /// Decision engine disconnected
    PeerClosed,
    /// Ctrl-C
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

pub struct MotorActuator {
    driver: MotorDriver,
}

impl MotorActuator {
    pub fn new(driver: MotorDriver) -> Self {
        Self { driver }
    }

    /// Handle one command line. Bad commands are logged and skipped.
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Continue;
        }

        info!("Command received: {}", line.to_ascii_lowercase());

        match line.parse::<ActuatorCommand>() {
            Ok(ActuatorCommand::Act(Action::Shutdown)) => return LineOutcome::Exit,
            Ok(ActuatorCommand::Act(action)) => {
                if let Err(e) = self.driver.apply(action) {
                    warn!("Failed to apply {}: {}", action, e);
                }
            }
            Ok(ActuatorCommand::SetSpeed(level)) => {
                if let Err(e) = self.driver.set_speed(level) {
                    warn!("Failed to set speed {}: {}", level, e);
                }
            }
            Err(e) => warn!("Ignoring {}", e),
        }

        LineOutcome::Continue
    }

    /// Accept one connection and run commands until shutdown
    pub fn serve(&mut self, listener: TcpListener, running: &AtomicBool) -> Result<ActuatorExit> {
        info!("Listening on {}...", listener.local_addr()?);

        let Some((stream, addr)) = accept_one(&listener, running, ACCEPT_POLL)? else {
            self.release_motors();
            return Ok(ActuatorExit::Cancelled);
        };
        info!("Connection from {}", addr);

        let mut reader = LineReader::new(stream, READ_TIMEOUT)?;
        let exit = loop {
            if !running.load(Ordering::SeqCst) {
                info!("Stopped by user");
                break ActuatorExit::Cancelled;
            }

            match reader.read_line() {
                Ok(ReadLine::Line(line)) => {
                    if self.handle_line(&line) == LineOutcome::Exit {
                        break ActuatorExit::Commanded;
                    }
                }
                Ok(ReadLine::Idle) => continue,
                Ok(ReadLine::Closed) => {
                    info!("Decision engine disconnected");
                    break ActuatorExit::PeerClosed;
                }
                Err(e) => {
                    warn!("Connection lost: {}", e);
                    break ActuatorExit::PeerClosed;
                }
            }
        };

        self.release_motors();
        Cleanup::new("actuator")
            .step("close connection", || reader.close())
            .finish();
        drop(listener);

        info!("Shutdown complete ({:?})", exit);
        Ok(exit)
    }

    fn release_motors(&mut self) {
        if self.driver.is_released() {
            return;
        }
        if let Err(e) = self.driver.apply(Action::Shutdown) {
            warn!("{}", e);
        }
    }

    pub fn driver(&self) -> &MotorDriver {
        &self.driver
    }
}
