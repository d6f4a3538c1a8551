//! Error types for the freefield toolbox.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Trial sequence does not have the shape the localization tests produce
    #[error("Invalid trial sequence: {0}")]
    InvalidSequence(String),

    /// Speaker id is not a row of the speaker position table
    #[error("Speaker {speaker} is out of range for a table with {count} speakers")]
    SpeakerOutOfRange {
        /// Offending speaker id
        speaker: usize,
        /// Number of rows in the position table
        count: usize,
    },

    /// Model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Perspective-n-point solve did not produce a pose
    #[error("Pose estimation failed: {0}")]
    PoseSolve(String),

    /// Image could not be read or decoded
    #[error("Failed to read image: {0}")]
    ImageRead(String),

    /// Image could not be encoded or written
    #[error("Failed to write image: {0}")]
    ImageWrite(String),

    /// Startup requires exactly one attached capture device
    #[error("There must be exactly one camera attached to the system, found {0}")]
    CameraCount(usize),

    /// Capture device operation failed
    #[error("Camera error: {0}")]
    Camera(String),

    /// A frame fetch did not complete in time
    #[error("No frame received within {0:?}")]
    FrameTimeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
