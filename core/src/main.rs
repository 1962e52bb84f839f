//! FUSION: command-line GPS/IMU track fusion.
//!
//! Two subcommands:
//!
//! - `fuse`: read a GPS log and an accelerometer log (CSV), fuse them with the
//!   planar Kalman filter, and write the fused track to CSV.
//! - `demo`: generate a synthetic constant-velocity scenario, fuse it, and
//!   write the track. Useful for a first look without recorded data.
//!
//! Filter tuning comes from an optional JSON config file (`--config`); fields
//! not present in the file keep their defaults.

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;

use sensorfuse::messages::{build_streams, FusionConfig, GpsFixRecord, ImuSampleRecord};
use sensorfuse::scheduler::run_fusion;
use sensorfuse::sim::{constant_velocity, ScenarioConfig};

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Fuse GPS fixes and body-frame accelerometer samples into a planar track."
)]
struct Cli {
    /// JSON file with filter tuning (position uncertainty, initial covariance
    /// scale, epoch match tolerance). Missing fields take defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "fuse",
        about = "Fuse recorded GPS and accelerometer CSV logs"
    )]
    Fuse(FuseArgs),
    #[command(
        name = "demo",
        about = "Fuse a synthetic constant-velocity scenario"
    )]
    Demo(DemoArgs),
}

#[derive(Args, Clone)]
struct FuseArgs {
    /// GPS log: time,lat,lon,alt,abs_vel,heading
    #[arg(long)]
    gps: PathBuf,

    /// Accelerometer log: time,x,y,z
    #[arg(long)]
    imu: PathBuf,

    /// Output CSV for the fused track
    #[arg(short, long, default_value = "fused_track.csv")]
    output: PathBuf,
}

#[derive(Args, Clone)]
struct DemoArgs {
    /// Scenario origin latitude in degrees
    #[arg(long, default_value_t = 40.7128)]
    lat: f64,

    /// Scenario origin longitude in degrees
    #[arg(long, default_value_t = -74.0060)]
    lon: f64,

    /// Scenario duration in seconds
    #[arg(long, default_value_t = 60.0)]
    duration: f64,

    /// Ground speed in m/s
    #[arg(long, default_value_t = 2.0)]
    speed: f64,

    /// Course in degrees clockwise from north
    #[arg(long, default_value_t = 45.0)]
    heading: f64,

    /// GPS noise standard deviation in meters
    #[arg(long, default_value_t = 2.0)]
    gps_noise: f64,

    /// Seed for the scenario noise generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output CSV for the fused track
    #[arg(short, long, default_value = "demo_track.csv")]
    output: PathBuf,
}

/// Stderr logger with wall-clock timestamps, so epoch diagnostics line up
/// with the sensor logs being fused.
fn init_logger(log_level: &str) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level
        .parse::<log::LevelFilter>()
        .map_err(|_| format!("unrecognized log level '{}'", log_level))?;
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .try_init()?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<FusionConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let config = FusionConfig::from_json(path)?;
            info!("loaded config from {}: {:?}", path.display(), config);
            Ok(config)
        }
        None => Ok(FusionConfig::default()),
    }
}

fn run_fuse(args: &FuseArgs, config: &FusionConfig) -> Result<(), Box<dyn Error>> {
    let gps_records = GpsFixRecord::from_csv(&args.gps)?;
    let imu_records = ImuSampleRecord::from_csv(&args.imu)?;
    info!(
        "loaded {} GPS rows from {} and {} IMU rows from {}",
        gps_records.len(),
        args.gps.display(),
        imu_records.len(),
        args.imu.display()
    );
    let (fixes, samples) = build_streams(&gps_records, &imu_records)?;
    let result = run_fusion(&fixes, &samples, config)?;
    result.to_csv(&args.output)?;
    info!(
        "wrote {} fused states to {}",
        result.len(),
        args.output.display()
    );
    Ok(())
}

fn run_demo(args: &DemoArgs, config: &FusionConfig) -> Result<(), Box<dyn Error>> {
    let scenario_config = ScenarioConfig {
        duration_s: args.duration,
        speed_mps: args.speed,
        heading_deg: args.heading,
        gps_noise_m: args.gps_noise,
        seed: args.seed,
        ..ScenarioConfig::default()
    };
    let scenario = constant_velocity(args.lat, args.lon, &scenario_config)?;
    info!(
        "generated scenario: {} fixes, {} samples, {:.0} s at {:.1} m/s",
        scenario.fixes.len(),
        scenario.samples.len(),
        args.duration,
        args.speed
    );
    let result = run_fusion(&scenario.fixes, &scenario.samples, config)?;
    result.to_csv(&args.output)?;
    info!(
        "wrote {} fused states to {}",
        result.len(),
        args.output.display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logger(&cli.log_level) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let outcome = load_config(cli.config.as_ref()).and_then(|config| match &cli.command {
        Command::Fuse(args) => run_fuse(args, &config),
        Command::Demo(args) => run_demo(args, &config),
    });
    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}
