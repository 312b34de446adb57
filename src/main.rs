use std::path::PathBuf;

use clap::Parser;
use fourwd_runtime::config::Config;
use fourwd_runtime::hw::{GpioBridge, SimEchoPins};
use fourwd_runtime::runtime::{self, BoxError};
use fourwd_runtime::sensor::PulseRangefinder;
use fourwd_runtime::{Hardware, Robot, SimHardware, telemetry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Remote-controlled 4WD runtime with automatic obstacle avoidance
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Address to listen on for the controller app
    #[arg(long)]
    bind: Option<String>,

    /// JSON config file (missing fields use built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the GPIO bridge; simulated hardware when omitted
    #[arg(long)]
    serial: Option<String>,

    /// Seed for the avoidance turn direction
    #[arg(long)]
    seed: Option<u64>,

    /// Publish drive state and health over zenoh
    #[arg(long)]
    telemetry: bool,

    /// Distance reported by the simulated rangefinder, in cm
    #[arg(long, default_value_t = 100.0)]
    sim_distance: f32,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = start(Args::parse()).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn start(args: Args) -> Result<(), BoxError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let hardware = match &args.serial {
        Some(port) => {
            let bridge = GpioBridge::open(port, config.sensor.speed_of_sound_cm_per_us)?;
            Hardware {
                motors: Box::new(bridge.clone()),
                rangefinder: Box::new(bridge.clone()),
                indicator: Box::new(bridge),
            }
        }
        None => {
            warn!("No --serial port given, running on simulated hardware");
            // Simulated echo pins, so pings go through the pulse-timing path
            let pins = SimEchoPins::with_distance(
                args.sim_distance,
                config.sensor.speed_of_sound_cm_per_us,
            );
            Hardware {
                rangefinder: Box::new(PulseRangefinder::new(pins, &config.sensor)),
                ..SimHardware::new(args.sim_distance).hardware()
            }
        }
    };

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let robot = Robot::new(config, hardware, rng);
    info!("4WD runtime starting (direction-only drive, auto obstacle avoidance)");

    if args.telemetry {
        let publisher = robot.clone();
        tokio::spawn(async move {
            if let Err(e) = telemetry::publish(publisher).await {
                warn!("Telemetry stopped: {}", e);
            }
        });
    }

    runtime::run(robot).await
}
