//! Constants used throughout the toolbox

/// Number of facial landmarks produced by the landmark predictor
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Number of landmarks matched against the 3D face template
pub const NUM_POSE_ANCHORS: usize = 14;

/// Number of lens distortion coefficients passed to the PnP solver (all zero)
pub const NUM_DISTORTION_COEFFS: i32 = 4;

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Image normalization constants for face detection
pub const IMAGE_NORMALIZATION_OFFSET: f32 = 127.5;
pub const IMAGE_NORMALIZATION_SCALE: f32 = 128.0;

/// Landmark model input edge length in pixels
pub const LANDMARK_INPUT_SIZE: i32 = 128;

/// Fraction of the face box added on each side before landmark prediction
pub const FACE_BOX_EXPANSION: f32 = 0.1;

/// Default timeout for a single frame fetch in milliseconds
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 1000;

/// Number of capture indices probed when enumerating devices
pub const DEFAULT_MAX_PROBE_DEVICES: i32 = 4;

/// Lower and upper percentiles of the elevation dispersion proxy
pub const EG_LOWER_PERCENTILE: f64 = 25.0;
pub const EG_UPPER_PERCENTILE: f64 = 75.0;
