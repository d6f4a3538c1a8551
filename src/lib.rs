//! Utilities for free-field sound localization experiments.
//!
//! This library provides two independent parts:
//! - Localization accuracy metrics (mean direction, MAD, RMSE, elevation gain)
//!   computed from recorded trial sequences
//! - Head pose estimation from a camera image using `OpenCV` and ONNX Runtime
//!
//! The head pose pipeline consists of:
//! 1. Face detection to locate faces in the image
//! 2. Facial landmark detection to find 68 key points
//! 3. Pose estimation with `PnP` (Perspective-n-Point) against a 14-point face template
//! 4. Decomposition of the pose matrix into pitch, yaw and roll
//!
//! # Examples
//!
//! ## Localization metrics
//!
//! ```
//! use freefield_toolbox::analysis::{eg, mad, mean_dir, rmse, SpeakerPositions, Target, TrialSequence, TrialTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sequence = TrialSequence {
//!     conditions: vec![
//!         Target { speaker: 0, azi: 0.0, ele: -12.5 },
//!         Target { speaker: 1, azi: 0.0, ele: 12.5 },
//!     ],
//!     trials: vec![1, 2, 1, 2],
//!     data: vec![(1.0, -10.0), (-2.0, 14.0), (-1.0, -14.0), (0.0, 11.0)],
//! };
//! let table = TrialTable::from_sequence(&sequence)?;
//!
//! let direction = mean_dir(&table, 0);
//! println!("Speaker 0 perceived at {:.1}°/{:.1}°", direction.azimuth, direction.elevation);
//! println!("MAD {:.2}, RMSE {:.2}", mad(&table, 0, None), rmse(&table, 0, None));
//!
//! let positions = SpeakerPositions::from_rows(&[(0.0, -12.5), (0.0, 12.5)]);
//! println!("Elevation gain {:.2}", eg(&table, Some(&positions))?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Head pose from an image
//!
//! ```no_run
//! use freefield_toolbox::{config::Config, pose_estimation::HeadPoseEstimator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let estimator = HeadPoseEstimator::from_config(&config)?;
//!
//! match estimator.estimate_from_path("subject.png", false)? {
//!     Some(pose) => println!("Pitch {:.2}°, yaw {:.2}°, roll {:.2}°", pose.pitch, pose.yaw, pose.roll),
//!     None => println!("No face in image"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Camera acquisition
//!
//! ```no_run
//! use freefield_toolbox::{camera::{Camera, VideoCaptureSystem}, config::CameraConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CameraConfig::default();
//! let system = VideoCaptureSystem::from_config(&config);
//! let mut camera = Camera::open(system, config)?;
//! let report = camera.acquire_images("capture.png", 5)?;
//! println!("Saved {} images", report.saved.len());
//! camera.close()?;
//! # Ok(())
//! # }
//! ```

/// Localization accuracy metrics over trial tables
pub mod analysis;

/// Single-camera capture session and image acquisition
pub mod camera;

/// Face detection module for finding faces in images
pub mod face_detection;

/// Facial landmark detection module for finding 68 key points
pub mod mark_detection;

/// Head pose estimation module using `PnP` algorithm
pub mod pose_estimation;

/// Utility functions for image processing and numeric conversions
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the toolbox
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
