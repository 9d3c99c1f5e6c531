// Range-finder side of the pipeline
//
// Provides:
// - ScanSource trait over whatever produces scans
// - RPLidar A1 serial driver
// - Replay of recorded scans from a text file
// - The streamer loop that flattens scans into sample records

mod replay;
pub mod rplidar;
mod streamer;

pub use replay::ReplaySource;
pub use rplidar::{LidarError, RplidarSource};
pub use streamer::{SensorStreamer, StreamEnd};

use crate::error::Result;
use crate::messages::Sample;

/// One full sweep of the sensor
pub type Scan = Vec<Sample>;

/// Anything that produces scans and has a motor to spin down
pub trait ScanSource {
    /// Next complete scan, `None` once the source is exhausted
    fn next_scan(&mut self) -> Result<Option<Scan>>;

    /// Stop scanning
    fn stop(&mut self) -> Result<()>;

    /// Power down the spin motor
    fn stop_motor(&mut self) -> Result<()>;

    /// Release the underlying device
    fn disconnect(&mut self) -> Result<()>;
}

impl<S: ScanSource + ?Sized> ScanSource for Box<S> {
    fn next_scan(&mut self) -> Result<Option<Scan>> {
        (**self).next_scan()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn stop_motor(&mut self) -> Result<()> {
        (**self).stop_motor()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
}
