// Flattens sensor scans into one "<angle>,<distance>" record per sample

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::ScanSource;
use crate::cleanup::{Cleanup, CleanupReport};
use crate::net::{close_stream, send_line};

/// Why streaming stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    /// The source has no more scans
    Exhausted,
    /// The decision engine went away
    SendFailed,
    /// Reading from the sensor failed
    SourceFailed,
}

pub struct SensorStreamer<S> {
    source: S,
    stream: TcpStream,
    throttle: Duration,
    sent: u64,
}

impl<S: ScanSource> SensorStreamer<S> {
    /// `stream` is the already connected decision engine
    pub fn new(source: S, stream: TcpStream, throttle: Duration) -> Self {
        Self {
            source,
            stream,
            throttle,
            sent: 0,
        }
    }

    /// Stream scans until cancelled, exhausted, or a send or read fails
    pub fn run(&mut self, running: &AtomicBool) -> StreamEnd {
        loop {
            if !running.load(Ordering::SeqCst) {
                info!("Stopped by user");
                return StreamEnd::Cancelled;
            }

            let scan = match self.source.next_scan() {
                Ok(Some(scan)) => scan,
                Ok(None) => {
                    info!("Scan source exhausted");
                    return StreamEnd::Exhausted;
                }
                Err(e) => {
                    error!("Failed to read scan: {}", e);
                    return StreamEnd::SourceFailed;
                }
            };

            debug!("Streaming scan with {} points", scan.len());
            for sample in &scan {
                if let Err(e) = send_line(&mut self.stream, &sample.to_line()) {
                    warn!("Connection closed: {}", e);
                    return StreamEnd::SendFailed;
                }
                self.sent += 1;
            }

            sleep(self.throttle);
        }
    }

    /// Stop the sensor, spin its motor down, release it, close the
    /// connection. Each step runs even if an earlier one failed.
    pub fn shutdown(mut self) -> CleanupReport {
        let source = &mut self.source;
        let report = Cleanup::new("sensor")
            .step("stop scan", || source.stop())
            .step("stop motor", || source.stop_motor())
            .step("disconnect", || source.disconnect())
            .step("close connection", || close_stream(&self.stream))
            .finish();

        info!("Shutdown complete ({} samples sent)", self.sent);
        report
    }

    pub fn samples_sent(&self) -> u64 {
        self.sent
    }
}
