//! Command line front end for head pose estimation, camera acquisition and localization analysis.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use freefield_toolbox::{
    analysis::{summarize, SpeakerPositions, TrialSequence, TrialTable},
    camera::{Camera, VideoCaptureSystem},
    config::Config,
    pose_estimation::HeadPoseEstimator,
};
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate pitch, yaw and roll of the face in an image
    Pose {
        /// Image file to analyse
        #[arg(short, long)]
        image: PathBuf,

        /// Show the pose overlay and wait for a key press
        #[arg(long)]
        plot: bool,
    },
    /// Capture images from the single attached camera
    Acquire {
        /// Output file; numbered per frame when capturing more than one
        #[arg(short, long)]
        output: PathBuf,

        /// Number of images to capture
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// List attached capture devices
    Devices,
    /// Print localization accuracy of a recorded trial sequence as YAML
    Analyze {
        /// Trial sequence file (YAML with conditions, trials and data)
        #[arg(short, long)]
        sequence: PathBuf,

        /// Speaker positions as a YAML list of `[azimuth, elevation]` rows
        #[arg(short, long)]
        positions: Option<PathBuf>,
    },
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Cannot parse {}", path.display()))
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    info!("Loading configuration from: {}", path.display());
    match Config::from_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load config file: {}. Using defaults.", e);
            Config::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));

    let config = load_config(args.config.as_ref());
    config.validate()?;

    match args.command {
        Command::Pose { image, plot } => {
            config.validate_models()?;
            let estimator = HeadPoseEstimator::from_config(&config)?;
            match estimator.estimate_from_path(&image, plot || config.pose.plot)? {
                Some(pose) => println!("{:.2} {:.2} {:.2}", pose.pitch, pose.yaw, pose.roll),
                None => println!("no face detected"),
            }
        }
        Command::Acquire { output, count } => {
            let system = VideoCaptureSystem::from_config(&config.camera);
            let mut camera = Camera::open(system, config.camera.clone())?;
            let report = camera.acquire_images(&output, count)?;
            camera.close()?;
            for path in &report.saved {
                println!("{}", path.display());
            }
            if !report.skipped.is_empty() {
                warn!("Skipped incomplete frames: {:?}", report.skipped);
            }
        }
        Command::Devices => {
            use freefield_toolbox::camera::{CaptureDevice, CaptureSystem};

            let mut system = VideoCaptureSystem::from_config(&config.camera);
            info!("{}", system.library_version());
            let devices = system.devices()?;
            println!("{} capture device(s) found", devices.len());
            for device in &devices {
                for (name, value) in device.device_info()? {
                    println!("  {name}: {value}");
                }
            }
            drop(devices);
            system.release();
        }
        Command::Analyze { sequence, positions } => {
            let sequence: TrialSequence = read_yaml(&sequence)?;
            let table = TrialTable::from_sequence(&sequence)?;
            let positions = match positions {
                Some(path) => Some(SpeakerPositions::from_rows(&read_yaml::<Vec<(f64, f64)>>(&path)?)),
                None => None,
            };
            let summary = summarize(&table, positions.as_ref())?;
            print!("{}", serde_yaml::to_string(&summary)?);
        }
    }

    Ok(())
}
