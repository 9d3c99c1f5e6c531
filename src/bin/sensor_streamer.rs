// Streams lidar samples to the decision engine
//
// Usage: sensor-streamer [--lidar-port /dev/ttyUSB0] [--host 127.0.0.1] [--port 6000]
//        sensor-streamer --replay recorded_scans.txt

use std::net::TcpStream;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use obstacle_avoid_runtime::cleanup::Cleanup;
use obstacle_avoid_runtime::config::{Config, SensorConfig};
use obstacle_avoid_runtime::sensor::{
    ReplaySource, RplidarSource, ScanSource, SensorStreamer, StreamEnd,
};
use obstacle_avoid_runtime::signal::install_ctrl_c_handler;
use obstacle_avoid_runtime::{Error, Result, init_logging};

#[derive(Debug, Parser)]
#[command(name = "sensor-streamer", about = "Stream lidar samples to the decision engine")]
struct Args {
    /// JSON config file shared by all three processes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Decision engine host
    #[arg(long)]
    host: Option<String>,

    /// Decision engine port
    #[arg(long)]
    port: Option<u16>,

    /// Lidar serial device
    #[arg(long)]
    lidar_port: Option<String>,

    #[arg(long)]
    baudrate: Option<u32>,

    /// Lidar motor PWM
    #[arg(long)]
    pwm: Option<u16>,

    /// Input backlog (in measurements) before the lidar buffer is flushed
    #[arg(long)]
    max_buf_meas: Option<usize>,

    /// Pause between scans in milliseconds
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Replay scans from a recording instead of reading the lidar
    #[arg(long)]
    replay: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut SensorConfig) {
        if let Some(host) = self.host {
            config.connect_host = host;
        }
        if let Some(port) = self.port {
            config.connect_port = port;
        }
        if let Some(lidar_port) = self.lidar_port {
            config.lidar_port = lidar_port;
        }
        if let Some(baudrate) = self.baudrate {
            config.lidar_baudrate = baudrate;
        }
        if let Some(pwm) = self.pwm {
            config.lidar_pwm = pwm;
        }
        if let Some(max_buf_meas) = self.max_buf_meas {
            config.max_buf_meas = max_buf_meas;
        }
        if let Some(throttle_ms) = self.throttle_ms {
            config.scan_throttle_ms = throttle_ms;
        }
        if self.replay.is_some() {
            config.replay = self.replay;
        }
    }
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?.sensor;
    args.apply(&mut config);

    let running = install_ctrl_c_handler()?;

    let mut source: Box<dyn ScanSource> = match &config.replay {
        Some(path) => Box::new(ReplaySource::open(path)?),
        None => Box::new(RplidarSource::open(
            &config.lidar_port,
            config.lidar_baudrate,
            config.lidar_pwm,
            config.max_buf_meas,
        )?),
    };

    let addr = config.connect_addr();
    let stream = match TcpStream::connect(&addr) {
        Ok(stream) => stream,
        Err(e) => {
            // Don't leave the lidar spinning on the way out
            Cleanup::new("sensor")
                .step("stop motor", || source.stop_motor())
                .step("disconnect", || source.disconnect())
                .finish();
            return Err(Error::Other(format!(
                "cannot connect to decision engine at {}: {}",
                addr, e
            )));
        }
    };
    info!("Connected to decision engine at {}", addr);

    let mut streamer = SensorStreamer::new(source, stream, config.scan_throttle());
    let end = streamer.run(&running);
    streamer.shutdown();

    match end {
        StreamEnd::SourceFailed => Err(Error::Other("lidar stopped delivering scans".into())),
        StreamEnd::Cancelled | StreamEnd::Exhausted | StreamEnd::SendFailed => Ok(()),
    }
}
