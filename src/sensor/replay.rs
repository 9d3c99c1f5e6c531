// Recorded scans played back from a text file
//
// Format: one "angle,distance" per line. A blank line ends a scan.
// Lines starting with '#' are comments and also end a scan.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info, warn};

use super::{Scan, ScanSource};
use crate::error::{Error, Result};
use crate::messages::Sample;

pub struct ReplaySource {
    lines: Box<dyn Iterator<Item = std::io::Result<String>>>,
    line_no: usize,
    exhausted: bool,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Other(format!("cannot open replay {}: {}", path.display(), e)))?;
        info!("Replaying scans from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            lines: Box::new(reader.lines()),
            line_no: 0,
            exhausted: false,
        }
    }
}

impl ScanSource for ReplaySource {
    fn next_scan(&mut self) -> Result<Option<Scan>> {
        let mut scan = Scan::new();

        while !self.exhausted {
            let Some(line) = self.lines.next() else {
                self.exhausted = true;
                break;
            };
            let line = line?;
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                if scan.is_empty() {
                    continue;
                }
                break;
            }

            match Sample::parse(trimmed) {
                Some(sample) => scan.push(sample),
                None => warn!("Replay line {}: skipping {:?}", self.line_no, trimmed),
            }
        }

        if scan.is_empty() {
            return Ok(None);
        }
        debug!("Replay scan with {} points", scan.len());
        Ok(Some(scan))
    }

    fn stop(&mut self) -> Result<()> {
        self.exhausted = true;
        Ok(())
    }

    fn stop_motor(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.lines = Box::new(std::iter::empty());
        Ok(())
    }
}
