// Obstacle classification and the decision engine loop
//
// Sensor samples come in on one accepted connection, one action per sample
// goes out to the motor actuator. The policy is stateless: every sample is
// judged on its own.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::cleanup::{Cleanup, CleanupReport};
use crate::config::{ACCEPT_POLL, OBSTACLE_THRESHOLD_MM, READ_TIMEOUT};
use crate::error::Result;
use crate::messages::{Action, Sample};
use crate::net::{LineReader, ReadLine, accept_one, close_stream, send_line};

/// Angular sector of a sample, relative to the robot's heading (0 deg)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sector {
    /// angle >= 330 or angle <= 30
    Front,
    /// 30 < angle <= 90
    Left,
    /// 270 <= angle < 330
    Right,
    Rear,
}

impl Sector {
    pub fn of(angle: f64) -> Self {
        if angle >= 330.0 || angle <= 30.0 {
            Sector::Front
        } else if angle <= 90.0 {
            Sector::Left
        } else if angle >= 270.0 {
            Sector::Right
        } else {
            Sector::Rear
        }
    }
}

/// Decide what to do about one sample
///
/// Anything beyond `threshold` mm is clear road. Closer obstacles stop the
/// robot when in front and steer it away when to one side; the rear is
/// ignored.
pub fn classify(angle: f64, distance: f64, threshold: f64) -> Action {
    if distance > threshold {
        return Action::Forward;
    }

    match Sector::of(angle) {
        Sector::Front => Action::Stop,
        Sector::Left => Action::TurnRight,
        Sector::Right => Action::TurnLeft,
        Sector::Rear => Action::Forward,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    threshold: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(OBSTACLE_THRESHOLD_MM)
    }
}

impl Classifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn classify(&self, sample: &Sample) -> Action {
        classify(sample.angle, sample.distance, self.threshold)
    }
}

/// Why the decision loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Cancelled,
    /// Sensor streamer disconnected
    SensorClosed,
    /// Sending to the actuator failed
    ActuatorLost,
}

pub struct DecisionEngine {
    classifier: Classifier,
    actuator: TcpStream,
}

impl DecisionEngine {
    /// `actuator` is the already connected motor actuator stream
    pub fn new(actuator: TcpStream, classifier: Classifier) -> Self {
        Self {
            classifier,
            actuator,
        }
    }

    /// Classify one sensor record and forward the action
    ///
    /// Malformed records produce `Ok(None)` and nothing is sent. An error
    /// means the actuator connection is gone.
    pub fn handle_line(&mut self, line: &str) -> io::Result<Option<Action>> {
        let Some(sample) = Sample::parse(line) else {
            debug!("Skipping malformed record {:?}", line);
            return Ok(None);
        };

        let action = self.classifier.classify(&sample);
        info!(
            "Angle: {:.1}, Distance: {:.1} -> Action: {}",
            sample.angle, sample.distance, action
        );
        send_line(&mut self.actuator, &action.to_line())?;
        Ok(Some(action))
    }

    /// Accept the sensor streamer and classify its samples until shutdown
    pub fn run(&mut self, listener: TcpListener, running: &AtomicBool) -> Result<EngineExit> {
        info!(
            "Listening for lidar data on {} (obstacle threshold {} mm)",
            listener.local_addr()?,
            self.classifier.threshold()
        );

        let Some((stream, addr)) = accept_one(&listener, running, ACCEPT_POLL)? else {
            self.shutdown(listener, None);
            return Ok(EngineExit::Cancelled);
        };
        info!("Lidar connected from {}", addr);

        let mut reader = LineReader::new(stream, READ_TIMEOUT)?;
        let exit = loop {
            if !running.load(Ordering::SeqCst) {
                info!("Stopped by user");
                break EngineExit::Cancelled;
            }

            match reader.read_line() {
                Ok(ReadLine::Line(line)) => {
                    if let Err(e) = self.handle_line(&line) {
                        warn!("Lost connection to motor actuator: {}", e);
                        break EngineExit::ActuatorLost;
                    }
                }
                Ok(ReadLine::Idle) => continue,
                Ok(ReadLine::Closed) => {
                    info!("Lidar disconnected");
                    break EngineExit::SensorClosed;
                }
                Err(e) => {
                    warn!("Lidar connection lost: {}", e);
                    break EngineExit::SensorClosed;
                }
            }
        };

        self.shutdown(listener, Some(&reader));
        Ok(exit)
    }

    /// Stop the robot, tell the actuator to exit, then close every socket
    fn shutdown(&mut self, listener: TcpListener, sensor: Option<&LineReader>) -> CleanupReport {
        let actuator = &mut self.actuator;
        let report = Cleanup::new("decision")
            .step("send stop", || send_line(actuator, &Action::Stop.to_line()))
            .step("send exit", || send_line(actuator, &Action::Shutdown.to_line()))
            .step("close listener", || {
                drop(listener);
                Ok::<(), io::Error>(())
            })
            .step("close lidar connection", || match sensor {
                Some(reader) => reader.close(),
                None => Ok(()),
            })
            .step("close motor connection", || close_stream(actuator))
            .finish();

        info!("Shutdown complete");
        report
    }
}
