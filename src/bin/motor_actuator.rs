// Drives the wheel motors from decision engine commands
//
// Usage: motor-actuator [--port 5000] [--speed 0.5] [--turn-factor 0.6]
//        [--servo-port /dev/ttyACM0] [--simulate]

use std::net::TcpListener;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use obstacle_avoid_runtime::actuator::MotorActuator;
use obstacle_avoid_runtime::config::{ActuatorConfig, Config};
use obstacle_avoid_runtime::motor::{DriveSettings, MotorDriver, probe_hardware};
use obstacle_avoid_runtime::signal::install_ctrl_c_handler;
use obstacle_avoid_runtime::{Error, Result, init_logging};

#[derive(Debug, Parser)]
#[command(name = "motor-actuator", about = "Drive the wheel motors from motion commands")]
struct Args {
    /// JSON config file shared by all three processes
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Cruise speed in [0, 1]
    #[arg(long)]
    speed: Option<f32>,

    /// Inner wheel speed factor while turning
    #[arg(long)]
    turn_factor: Option<f32>,

    /// Wheel servo bus serial device
    #[arg(long)]
    servo_port: Option<String>,

    /// Use simulated motors even if the servo bus is present
    #[arg(long)]
    simulate: bool,
}

impl Args {
    fn apply(self, config: &mut ActuatorConfig) {
        if let Some(host) = self.host {
            config.listen_host = host;
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(speed) = self.speed {
            config.default_speed = speed;
        }
        if let Some(turn_factor) = self.turn_factor {
            config.turn_factor = turn_factor;
        }
        if let Some(servo_port) = self.servo_port {
            config.servo.port = servo_port;
        }
        config.simulate |= self.simulate;
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
    let mut config = Config::load(args.config.as_deref())?.actuator;
    args.apply(&mut config);

    let running = install_ctrl_c_handler()?;

    let driver = MotorDriver::new(
        probe_hardware(&config),
        DriveSettings {
            default_speed: config.default_speed,
            turn_factor: config.turn_factor,
        },
    );
    info!("Motors initialized ({} backend)", driver.backend_kind());

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .map_err(|e| Error::Other(format!("cannot listen on {}: {}", listen_addr, e)))?;

    let mut actuator = MotorActuator::new(driver);
    let exit = actuator.serve(listener, &running)?;
    info!("Motor actuator finished ({:?})", exit);
    Ok(())
}
