// Slamtec RPLidar A1 serial protocol, standard scan mode
//
// Request:    [0xA5, cmd] or [0xA5, cmd, size, payload..., xor checksum]
// Descriptor: [0xA5, 0x5A, len(30 bits) | mode(2 bits) as u32 LE, data type]
// Scan node:  5 bytes
//   byte 0: quality(6) | !S | S      (S = first node of a new sweep)
//   byte 1: angle_q6[6:0] | C         (C = check bit, always 1)
//   byte 2: angle_q6[14:7]
//   byte 3-4: distance_q2, little-endian

use std::io::{Read, Write};
use std::thread::sleep;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

use super::{Scan, ScanSource};
use crate::error::Result;
use crate::messages::Sample;

pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Time for the spin motor to reach speed before scanning
const SPIN_UP: Duration = Duration::from_secs(1);

/// Scans with this many points or fewer are dropped
const MIN_SCAN_LEN: usize = 5;

const SYNC_BYTE: u8 = 0xA5;
const SYNC_BYTE2: u8 = 0x5A;
const DESCRIPTOR_LEN: usize = 7;
const NODE_LEN: usize = 5;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop = 0x25,
    Scan = 0x20,
    GetHealth = 0x52,
    SetPwm = 0xF0,
}

const SCAN_DATA_TYPE: u8 = 0x81;
const HEALTH_DATA_TYPE: u8 = 0x06;

#[derive(Debug, thiserror::Error)]
pub enum LidarError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response descriptor: {0}")]
    Descriptor(String),

    #[error("Invalid scan node: {0}")]
    Node(&'static str),

    #[error("Lidar reports error state (code {code})")]
    Health { code: u16 },
}

/// One decoded measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanNode {
    pub start: bool,
    pub quality: u8,
    /// Degrees
    pub angle: f64,
    /// Millimetres, 0 means no return
    pub distance: f64,
}

impl ScanNode {
    pub fn parse(raw: &[u8; NODE_LEN]) -> std::result::Result<Self, LidarError> {
        let start = raw[0] & 0b1 != 0;
        let inverse_start = (raw[0] >> 1) & 0b1 != 0;
        if start == inverse_start {
            return Err(LidarError::Node("start flags mismatch"));
        }
        if raw[1] & 0b1 != 1 {
            return Err(LidarError::Node("check bit not set"));
        }

        let angle_q6 = ((raw[1] as u16) >> 1) | ((raw[2] as u16) << 7);
        let distance_q2 = u16::from_le_bytes([raw[3], raw[4]]);

        Ok(Self {
            start,
            quality: raw[0] >> 2,
            angle: angle_q6 as f64 / 64.0,
            distance: distance_q2 as f64 / 4.0,
        })
    }
}

/// Build a request packet
pub fn build_request(command: Command, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![SYNC_BYTE, command as u8];
    if !payload.is_empty() {
        packet.push(payload.len() as u8);
        packet.extend_from_slice(payload);
        let checksum = packet.iter().fold(0u8, |acc, b| acc ^ b);
        packet.push(checksum);
    }
    packet
}

/// Response descriptor: payload length and data type
pub fn parse_descriptor(
    raw: &[u8; DESCRIPTOR_LEN],
) -> std::result::Result<(u32, u8), LidarError> {
    if raw[0] != SYNC_BYTE || raw[1] != SYNC_BYTE2 {
        return Err(LidarError::Descriptor(format!(
            "bad sync bytes {:02X?}",
            &raw[..2]
        )));
    }
    let len_mode = u32::from_le_bytes([raw[2], raw[3], raw[4], raw[5]]);
    Ok((len_mode & 0x3FFF_FFFF, raw[6]))
}

/// Groups nodes into sweeps on the start flag
#[derive(Debug, Default)]
pub struct ScanAssembler {
    current: Scan,
}

impl ScanAssembler {
    /// Feed one node; returns the previous sweep when a new one starts
    pub fn push(&mut self, node: ScanNode) -> Option<Scan> {
        let mut finished = None;
        if node.start {
            let scan = std::mem::take(&mut self.current);
            if scan.len() > MIN_SCAN_LEN {
                finished = Some(scan);
            } else {
                debug!("Dropping short scan ({} points)", scan.len());
            }
        }
        if node.distance > 0.0 {
            self.current.push(Sample::new(node.angle, node.distance));
        }
        finished
    }
}

pub struct RplidarSource {
    port: Option<Box<dyn SerialPort>>,
    assembler: ScanAssembler,
    /// Input backlog, in nodes, beyond which the buffer is flushed
    max_buf_meas: usize,
    scanning: bool,
}

impl RplidarSource {
    /// Open the lidar, check its health and spin the motor up
    pub fn open(port_name: &str, baudrate: u32, pwm: u16, max_buf_meas: usize) -> Result<Self> {
        info!("Opening lidar on {}", port_name);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(LidarError::from)?;

        let mut lidar = Self {
            port: Some(port),
            assembler: ScanAssembler::default(),
            max_buf_meas,
            scanning: false,
        };

        lidar.check_health()?;
        lidar.start_motor(pwm)?;
        sleep(SPIN_UP);
        Ok(lidar)
    }

    fn port(&mut self) -> std::result::Result<&mut Box<dyn SerialPort>, LidarError> {
        self.port.as_mut().ok_or_else(|| {
            LidarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "lidar disconnected",
            ))
        })
    }

    fn send(&mut self, command: Command, payload: &[u8]) -> std::result::Result<(), LidarError> {
        let packet = build_request(command, payload);
        let port = self.port()?;
        port.write_all(&packet)?;
        port.flush()?;
        Ok(())
    }

    fn read_descriptor(&mut self, expected_type: u8) -> std::result::Result<u32, LidarError> {
        let mut raw = [0u8; DESCRIPTOR_LEN];
        self.port()?.read_exact(&mut raw)?;
        let (len, data_type) = parse_descriptor(&raw)?;
        if data_type != expected_type {
            return Err(LidarError::Descriptor(format!(
                "expected data type 0x{:02X}, got 0x{:02X}",
                expected_type, data_type
            )));
        }
        Ok(len)
    }

    fn check_health(&mut self) -> std::result::Result<(), LidarError> {
        self.send(Command::GetHealth, &[])?;
        self.read_descriptor(HEALTH_DATA_TYPE)?;

        let mut raw = [0u8; 3];
        self.port()?.read_exact(&mut raw)?;
        let code = u16::from_le_bytes([raw[1], raw[2]]);
        match raw[0] {
            0 => debug!("Lidar health good"),
            1 => warn!("Lidar health warning (code {})", code),
            _ => return Err(LidarError::Health { code }),
        }
        Ok(())
    }

    fn set_pwm(&mut self, pwm: u16) -> std::result::Result<(), LidarError> {
        self.send(Command::SetPwm, &pwm.to_le_bytes())
    }

    fn start_motor(&mut self, pwm: u16) -> std::result::Result<(), LidarError> {
        info!("Starting lidar motor (pwm {})", pwm);
        self.port()?.write_data_terminal_ready(false)?;
        self.set_pwm(pwm)
    }

    fn start_scan(&mut self) -> std::result::Result<(), LidarError> {
        self.send(Command::Scan, &[])?;
        let len = self.read_descriptor(SCAN_DATA_TYPE)?;
        if len as usize != NODE_LEN {
            return Err(LidarError::Descriptor(format!(
                "expected {} byte nodes, got {}",
                NODE_LEN, len
            )));
        }
        self.scanning = true;
        Ok(())
    }

    /// Stop and restart the scan when the driver falls behind the sensor
    fn drain_backlog(&mut self) -> std::result::Result<(), LidarError> {
        let waiting = self.port()?.bytes_to_read()? as usize;
        let limit = self.max_buf_meas * NODE_LEN;
        if self.max_buf_meas > 0 && waiting > limit {
            warn!(
                "Too many bytes in the input buffer: {}/{}. Cleaning buffer...",
                waiting, limit
            );
            self.send(Command::Stop, &[])?;
            sleep(Duration::from_millis(1));
            self.port()?.clear(ClearBuffer::Input)?;
            self.assembler = ScanAssembler::default();
            self.start_scan()?;
        }
        Ok(())
    }

    fn read_node(&mut self) -> std::result::Result<ScanNode, LidarError> {
        let mut raw = [0u8; NODE_LEN];
        self.port()?.read_exact(&mut raw)?;

        loop {
            match ScanNode::parse(&raw) {
                Ok(node) => return Ok(node),
                Err(e) => {
                    // Slide one byte to find the node boundary again
                    debug!("{}, resyncing", e);
                    raw.copy_within(1.., 0);
                    self.port()?.read_exact(&mut raw[NODE_LEN - 1..])?;
                }
            }
        }
    }
}

impl ScanSource for RplidarSource {
    fn next_scan(&mut self) -> Result<Option<Scan>> {
        if self.port.is_none() {
            return Ok(None);
        }
        if !self.scanning {
            self.start_scan()?;
        }

        loop {
            self.drain_backlog()?;
            let node = self.read_node()?;
            if let Some(scan) = self.assembler.push(node) {
                return Ok(Some(scan));
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        info!("Stopping lidar scan");
        self.send(Command::Stop, &[])?;
        self.scanning = false;
        sleep(Duration::from_millis(100));
        self.port()?.clear(ClearBuffer::Input).map_err(LidarError::from)?;
        Ok(())
    }

    fn stop_motor(&mut self) -> Result<()> {
        info!("Stopping lidar motor");
        self.set_pwm(0)?;
        sleep(Duration::from_millis(1));
        self.port()?
            .write_data_terminal_ready(true)
            .map_err(LidarError::from)?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!("Lidar disconnected");
        }
        Ok(())
    }
}
