// Classifies lidar samples and drives the motor actuator
//
// Usage: decision-engine [--listen-port 6000] [--actuator-host 127.0.0.1]
//        [--actuator-port 5000] [--threshold 400]

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use obstacle_avoid_runtime::config::{Config, DecisionConfig};
use obstacle_avoid_runtime::decision::{Classifier, DecisionEngine};
use obstacle_avoid_runtime::signal::install_ctrl_c_handler;
use obstacle_avoid_runtime::{Error, Result, init_logging};

#[derive(Debug, Parser)]
#[command(name = "decision-engine", about = "Turn lidar samples into motor commands")]
struct Args {
    /// JSON config file shared by all three processes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept the sensor streamer on
    #[arg(long)]
    listen_host: Option<String>,

    #[arg(long)]
    listen_port: Option<u16>,

    /// Motor actuator host
    #[arg(long)]
    actuator_host: Option<String>,

    #[arg(long)]
    actuator_port: Option<u16>,

    /// Obstacles closer than this (mm) trigger avoidance
    #[arg(long)]
    threshold: Option<f64>,
}

impl Args {
    fn apply(self, config: &mut DecisionConfig) {
        if let Some(host) = self.listen_host {
            config.listen_host = host;
        }
        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }
        if let Some(host) = self.actuator_host {
            config.connect_host = host;
        }
        if let Some(port) = self.actuator_port {
            config.connect_port = port;
        }
        if let Some(threshold) = self.threshold {
            config.obstacle_threshold_mm = threshold;
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
    let mut config = Config::load(args.config.as_deref())?.decision;
    args.apply(&mut config);

    let threshold = config.obstacle_threshold_mm;
    if threshold.is_nan() || threshold < 0.0 {
        return Err(Error::Config(format!(
            "obstacle threshold must be a non-negative number, got {}",
            threshold
        )));
    }

    let running = install_ctrl_c_handler()?;

    let actuator_addr = config.connect_addr();
    let actuator = TcpStream::connect(&actuator_addr).map_err(|e| {
        Error::Other(format!(
            "cannot connect to motor actuator at {}: {}",
            actuator_addr, e
        ))
    })?;
    info!("Connected to motor actuator at {}", actuator_addr);

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .map_err(|e| Error::Other(format!("cannot listen on {}: {}", listen_addr, e)))?;

    let mut engine = DecisionEngine::new(actuator, Classifier::new(threshold));
    let exit = engine.run(listener, &running)?;
    info!("Decision engine finished ({:?})", exit);
    Ok(())
}
