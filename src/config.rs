//! Configuration management for the freefield toolbox

use crate::{
    constants::{DEFAULT_FRAME_TIMEOUT_MS, DEFAULT_MAX_PROBE_DEVICES},
    utils::image_conversion::PixelFormat,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Toolbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub models: ModelConfig,

    /// Face detection configuration
    pub face_detection: FaceDetectionConfig,

    /// Camera configuration
    pub camera: CameraConfig,

    /// Pose estimation configuration
    pub pose: PoseConfig,
}

/// Model file paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to face detection ONNX model
    pub face_detector: PathBuf,

    /// Path to facial landmarks ONNX model
    pub face_landmarks: PathBuf,
}

/// Face detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Confidence threshold for face detection (0.0-1.0)
    pub confidence_threshold: f32,

    /// IOU threshold for non-maximum suppression (0.0-1.0)
    pub nms_threshold: f32,
}

/// Capture device parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Maximum time to wait for one frame in milliseconds
    pub frame_timeout_ms: u64,

    /// Pixel format of saved images
    pub pixel_format: PixelFormat,

    /// Number of capture indices probed during enumeration
    pub max_probe_devices: i32,

    /// Requested frame size as `[width, height]`, device default if absent
    pub resolution: Option<(u32, u32)>,
}

/// Pose estimation parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Show the debug overlay window after each estimate
    pub plot: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/face_detector.onnx"),
            face_landmarks: PathBuf::from("assets/face_landmarks.onnx"),
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            pixel_format: PixelFormat::Mono8,
            max_probe_devices: DEFAULT_MAX_PROBE_DEVICES,
            resolution: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.face_detection.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_detection.nms_threshold) {
            return Err(Error::ConfigError(
                "NMS threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.camera.frame_timeout_ms == 0 {
            return Err(Error::ConfigError("Frame timeout must be greater than 0".to_string()));
        }
        if self.camera.max_probe_devices <= 0 {
            return Err(Error::ConfigError(
                "At least one capture device index must be probed".to_string(),
            ));
        }
        if matches!(self.camera.resolution, Some((0, _) | (_, 0))) {
            return Err(Error::ConfigError("Resolution must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Check that both model files exist
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the missing model
    pub fn validate_models(&self) -> Result<()> {
        for (name, path) in [
            ("Face detector", &self.models.face_detector),
            ("Face landmarks", &self.models.face_landmarks),
        ] {
            if !path.exists() {
                return Err(Error::ConfigError(format!(
                    "{name} model not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Freefield toolbox configuration

# Model paths
models:
  face_detector: "assets/face_detector.onnx"
  face_landmarks: "assets/face_landmarks.onnx"

# Face detection parameters
face_detection:
  confidence_threshold: 0.5
  nms_threshold: 0.4

# Camera acquisition
camera:
  frame_timeout_ms: 1000
  pixel_format: mono8
  max_probe_devices: 4

# Head pose estimation
pose:
  plot: false
"#;
