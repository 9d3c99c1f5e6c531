// Wire records exchanged between the three processes
//
// sensor -> decision:   "<angle>,<distance>\n"
// decision -> actuator: "<command>\n"

use std::fmt;
use std::str::FromStr;

/// One angle/distance reading from the range finder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Degrees, [0, 360)
    pub angle: f64,
    /// Millimetres
    pub distance: f64,
}

impl Sample {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle, distance }
    }

    /// Encode as a newline-terminated wire record
    pub fn to_line(&self) -> String {
        format!("{},{}\n", self.angle, self.distance)
    }

    /// Parse one wire record (without its newline)
    ///
    /// Returns `None` for anything that isn't exactly two finite numbers with
    /// a non-negative distance. Such records are dropped by the receiver.
    pub fn parse(line: &str) -> Option<Self> {
        let (angle, distance) = line.trim().split_once(',')?;
        if distance.contains(',') {
            return None;
        }

        let angle: f64 = angle.trim().parse().ok()?;
        let distance: f64 = distance.trim().parse().ok()?;

        if !angle.is_finite() || !distance.is_finite() || distance < 0.0 {
            return None;
        }

        Some(Self { angle, distance })
    }
}

/// Discrete motion command derived from a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Forward,
    Backward,
    Stop,
    TurnLeft,
    TurnRight,
    Shutdown,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Forward,
        Action::Backward,
        Action::Stop,
        Action::TurnLeft,
        Action::TurnRight,
        Action::Shutdown,
    ];

    /// Command word used on the wire
    pub fn as_command(&self) -> &'static str {
        match self {
            Action::Forward => "forward",
            Action::Backward => "backward",
            Action::Stop => "stop",
            Action::TurnLeft => "left",
            Action::TurnRight => "right",
            Action::Shutdown => "exit",
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}\n", self.as_command())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_command())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command {:?}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Action {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_command() == word)
            .ok_or_else(|| UnknownCommand(s.trim().to_string()))
    }
}

/// Everything the actuator understands on its command stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Act(Action),
    /// `speed <level>`, level in [0, 1] (clamped by the driver)
    SetSpeed(f32),
}

impl ActuatorCommand {
    pub fn to_line(&self) -> String {
        match self {
            ActuatorCommand::Act(action) => action.to_line(),
            ActuatorCommand::SetSpeed(level) => format!("speed {}\n", level),
        }
    }
}

impl FromStr for ActuatorCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut parts = trimmed.split_whitespace();

        match (parts.next(), parts.next(), parts.next()) {
            (Some(word), Some(level), None) if word.eq_ignore_ascii_case("speed") => level
                .parse::<f32>()
                .ok()
                .filter(|level| level.is_finite())
                .map(ActuatorCommand::SetSpeed)
                .ok_or_else(|| UnknownCommand(trimmed.to_string())),
            _ => trimmed.parse().map(ActuatorCommand::Act),
        }
    }
}
