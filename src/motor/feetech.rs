// Feetech STS serial bus servo protocol, wheel (velocity) mode subset
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::debug;

/// Serial read timeout for status packets
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Write = 0x03,
}

/// RAM registers used for wheel control
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    OperatingMode = 33, // 1 byte: 0=position, 1=velocity
    TorqueEnable = 40,  // 1 byte: 0=off, 1=on
    GoalVelocity = 46,  // 2 bytes, sign-magnitude
    Lock = 55,          // 1 byte: 0=unlocked, 1=locked
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("servo bus: {0}")]
    Serial(#[from] serialport::Error),

    #[error("servo bus i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("servo {id} sent a bad status packet: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("servo {id} status packet failed its checksum")]
    ChecksumMismatch { id: u8 },

    #[error("servo {id} reported error flags 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("servo {id} did not answer")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Anything the bus can talk through: a serial port, or an in-memory port in tests
pub trait BusPort: Read + Write {}

impl<T: Read + Write> BusPort for T {}

pub struct FeetechBus {
    port: Box<dyn BusPort>,
}

impl FeetechBus {
    /// Open the bus on a serial device
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::from_port(port))
    }

    pub fn from_port(port: impl BusPort + 'static) -> Self {
        Self {
            port: Box::new(port),
        }
    }

    /// Checksum over id, length, instruction and params
    pub(crate) fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    pub(crate) fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(6 + params.len());
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push((params.len() + 2) as u8);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));
        packet
    }

    /// Send one instruction and wait for the servo's status reply
    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_status(id)
    }

    fn read_exact(&mut self, id: u8, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::UnexpectedEof => {
                FeetechError::Timeout { id }
            }
            _ => FeetechError::Io(e),
        })
    }

    /// Read a status packet and return its params
    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.read_exact(expected_id, &mut head)?;

        let [h0, h1, id, length] = head;
        let bad = |reason: String| FeetechError::InvalidResponse {
            id: expected_id,
            reason,
        };
        if [h0, h1] != HEADER {
            return Err(bad(format!("header {:02X} {:02X}", h0, h1)));
        }
        if id != expected_id {
            return Err(bad(format!("answer came from servo {}", id)));
        }
        if length < 2 {
            return Err(bad(format!("length byte {}", length)));
        }

        // error flags, params, checksum
        let mut frame = vec![0u8; length as usize];
        self.read_exact(id, &mut frame)?;

        let Some((&checksum, body)) = frame.split_last() else {
            return Err(bad("empty frame".to_string()));
        };
        let summed: Vec<u8> = [id, length].iter().chain(body).copied().collect();
        if Self::checksum(&summed) != checksum {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        match body.split_first() {
            Some((&0, params)) => Ok(params.to_vec()),
            Some((&status, _)) => Err(FeetechError::MotorError { id, status }),
            None => Err(bad("missing error byte".to_string())),
        }
    }

    /// Ping a motor; `Ok(false)` if nothing answered
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("servo {} {:?} <- {}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])
            .map(drop)
    }

    /// Write a signed value as little-endian sign-magnitude
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let [lo, hi] = encode_sign_magnitude(value).to_le_bytes();
        debug!("servo {} {:?} <- {}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])
            .map(drop)
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be disabled first
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    pub fn set_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_i16(id, Register::GoalVelocity, velocity)
    }
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (value.unsigned_abs() & 0x7FFF)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::rc::Rc;

    use super::FeetechBus;

    /// In-memory servo bus: answers every packet addressed to a known id
    /// with an OK status and records what was written.
    #[derive(Clone, Default)]
    pub struct ServoSim {
        inner: Rc<RefCell<SimState>>,
    }

    #[derive(Default)]
    struct SimState {
        ids: Vec<u8>,
        written: Vec<u8>,
        replies: VecDeque<u8>,
        packets: Vec<(u8, u8, Vec<u8>)>,
    }

    impl ServoSim {
        pub fn with_ids(ids: &[u8]) -> Self {
            let sim = Self::default();
            sim.inner.borrow_mut().ids = ids.to_vec();
            sim
        }

        /// (id, instruction, params) of every packet received so far
        pub fn packets(&self) -> Vec<(u8, u8, Vec<u8>)> {
            self.inner.borrow().packets.clone()
        }
    }

    impl Write for ServoSim {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.inner.borrow_mut();
            state.written.extend_from_slice(buf);

            // Parse every complete packet written so far
            while state.written.len() >= 4 {
                let total = 4 + state.written[3] as usize;
                if state.written.len() < total {
                    break;
                }
                let packet: Vec<u8> = state.written.drain(..total).collect();
                let (id, instruction) = (packet[2], packet[4]);
                let params = packet[5..total - 1].to_vec();
                state.packets.push((id, instruction, params));

                if state.ids.contains(&id) {
                    let checksum = FeetechBus::checksum(&[id, 2, 0]);
                    state.replies.extend([0xFF, 0xFF, id, 2, 0, checksum]);
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for ServoSim {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.inner.borrow_mut();
            if state.replies.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
            }
            let n = buf.len().min(state.replies.len());
            for (slot, byte) in buf.iter_mut().zip(state.replies.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ServoSim;
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(1500), 1500);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);
    }

    #[test]
    fn test_build_ping_packet() {
        let packet = FeetechBus::build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 1, 2, 0x01]);
    }

    #[test]
    fn test_ping_answers_and_times_out() {
        let mut bus = FeetechBus::from_port(ServoSim::with_ids(&[1]));
        assert!(bus.ping(1).unwrap());
        assert!(!bus.ping(9).unwrap());
    }

    #[test]
    fn test_set_velocity_writes_goal_register() {
        let sim = ServoSim::with_ids(&[2]);
        let mut bus = FeetechBus::from_port(sim.clone());

        bus.set_velocity(2, -1500).unwrap();

        let [lo, hi] = encode_sign_magnitude(-1500).to_le_bytes();
        assert_eq!(
            sim.packets(),
            vec![(2, Instruction::Write as u8, vec![Register::GoalVelocity as u8, lo, hi])]
        );
    }

    #[test]
    fn test_write_to_absent_motor_times_out() {
        let mut bus = FeetechBus::from_port(ServoSim::with_ids(&[]));
        let err = bus.enable_torque(4).unwrap_err();
        assert!(matches!(err, FeetechError::Timeout { id: 4 }));
    }
}
