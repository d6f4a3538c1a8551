//! Single-camera capture session.
//!
//! The capture runtime is modelled by two traits: a [`CaptureSystem`] that
//! stands for the process-wide driver handle and enumerates devices, and a
//! [`CaptureDevice`] for one attached camera. [`Camera`] owns both for the
//! lifetime of a session and releases them when closed or dropped.
//!
//! [`VideoCaptureSystem`] implements the traits on top of OpenCV `videoio`.

use crate::{
    config::CameraConfig,
    constants::DEFAULT_FRAME_TIMEOUT_MS,
    utils::image_conversion::convert_pixel_format,
    Error, Result,
};
use opencv::{
    core::{Mat, Vector},
    imgcodecs,
    prelude::*,
    videoio::{
        self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
        CAP_PROP_OPEN_TIMEOUT_MSEC, CAP_PROP_READ_TIMEOUT_MSEC,
    },
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Whether a fetched frame carries a complete image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// All image data arrived
    Complete,
    /// Transfer was incomplete, with a device specific status code
    Incomplete(i32),
}

/// One frame pulled from a capture device
pub struct Frame {
    /// Raw image as delivered by the device
    pub image: Mat,
    /// Transfer status
    pub status: FrameStatus,
}

impl Frame {
    /// Frame with complete image data
    #[must_use]
    pub fn complete(image: Mat) -> Self {
        Self {
            image,
            status: FrameStatus::Complete,
        }
    }

    /// Frame whose transfer ended early
    #[must_use]
    pub fn incomplete(image: Mat, code: i32) -> Self {
        Self {
            image,
            status: FrameStatus::Incomplete(code),
        }
    }
}

/// A single attached capture device
pub trait CaptureDevice {
    /// Device information as `(name, value)` pairs; empty if unavailable
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried
    fn device_info(&self) -> Result<Vec<(String, String)>>;

    /// Prepare the device for acquisition
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be initialized
    fn init(&mut self, config: &CameraConfig) -> Result<()>;

    /// Start streaming frames
    ///
    /// # Errors
    ///
    /// Returns an error if streaming cannot be started
    fn begin_acquisition(&mut self) -> Result<()>;

    /// Block until the next frame arrives or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTimeout`] when no frame arrives in time
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame>;

    /// Stop streaming frames
    ///
    /// # Errors
    ///
    /// Returns an error if streaming cannot be stopped
    fn end_acquisition(&mut self) -> Result<()>;

    /// Release device resources acquired by [`CaptureDevice::init`]
    ///
    /// # Errors
    ///
    /// Returns an error if the device reports a failure while closing
    fn deinit(&mut self) -> Result<()>;
}

/// Process-wide capture runtime that owns the attached devices
pub trait CaptureSystem {
    /// Device type produced by this runtime
    type Device: CaptureDevice;

    /// Human readable runtime version
    fn library_version(&self) -> String;

    /// Enumerate attached devices
    ///
    /// # Errors
    ///
    /// Returns an error if enumeration fails
    fn devices(&mut self) -> Result<Vec<Self::Device>>;

    /// Release the runtime; called exactly once per session
    fn release(&mut self);
}

/// Outcome of an acquisition batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Files written, in acquisition order
    pub saved: Vec<PathBuf>,
    /// Zero-based indices of frames skipped because they were incomplete
    pub skipped: Vec<usize>,
}

/// Owned session with exactly one initialized camera
pub struct Camera<S: CaptureSystem> {
    system: S,
    device: S::Device,
    config: CameraConfig,
    closed: bool,
}

impl<S: CaptureSystem> Camera<S> {
    /// Open the single attached camera
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraCount`] if not exactly one device is attached;
    /// the system is released before returning. Initialization errors are
    /// propagated after releasing the system as well.
    pub fn open(mut system: S, config: CameraConfig) -> Result<Self> {
        log::info!("Capture library version: {}", system.library_version());

        let mut devices = match system.devices() {
            Ok(devices) => devices,
            Err(e) => {
                system.release();
                return Err(e);
            }
        };

        if devices.len() != 1 {
            log::error!(
                "There must be exactly one camera attached to the system, found {}",
                devices.len()
            );
            let count = devices.len();
            drop(devices);
            system.release();
            return Err(Error::CameraCount(count));
        }
        let Some(mut device) = devices.pop() else {
            system.release();
            return Err(Error::CameraCount(0));
        };

        log_device_info(&device);
        if let Err(e) = device.init(&config) {
            log::error!("Failed to initialize camera: {}", e);
            drop(device);
            system.release();
            return Err(e);
        }
        log::info!("Camera initialized");

        Ok(Self {
            system,
            device,
            config,
            closed: false,
        })
    }

    /// Acquire `count` frames and write each to disk
    ///
    /// With `count == 1` the frame is written to `output`; otherwise frame `i`
    /// goes to `<stem>_<i>.<ext>` next to it. Incomplete frames are logged and
    /// skipped. Acquisition is always ended before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if acquisition cannot start, a frame fetch times out,
    /// conversion fails or a file cannot be written. Files written before the
    /// failure are left in place.
    pub fn acquire_images<P: AsRef<Path>>(&mut self, output: P, count: usize) -> Result<AcquisitionReport> {
        let output = output.as_ref();
        self.device.begin_acquisition()?;

        let result = self.acquire_batch(output, count);

        let ended = self.device.end_acquisition();
        let report = result?;
        ended?;

        log::info!(
            "Acquired {} of {} images ({} incomplete)",
            report.saved.len(),
            count,
            report.skipped.len()
        );
        Ok(report)
    }

    fn acquire_batch(&mut self, output: &Path, count: usize) -> Result<AcquisitionReport> {
        let timeout = Duration::from_millis(self.config.frame_timeout_ms);
        let mut report = AcquisitionReport::default();

        for index in 0..count {
            let frame = self.device.next_frame(timeout)?;
            if let FrameStatus::Incomplete(code) = frame.status {
                log::warn!("Image {} incomplete with image status {}, skipping", index, code);
                report.skipped.push(index);
                continue;
            }

            let converted = convert_pixel_format(&frame.image, self.config.pixel_format)?;
            let path = frame_path(output, index, count);
            write_image(&path, &converted)?;
            log::info!("Image saved at {}", path.display());
            report.saved.push(path);
        }

        Ok(report)
    }

    /// Deinitialize the camera and release the capture system
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails to deinitialize; the system is
    /// released regardless
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::info!("Deinitializing camera...");
        let result = self.device.deinit();
        self.system.release();
        result
    }
}

impl<S: CaptureSystem> Drop for Camera<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Failed to deinitialize camera: {}", e);
        }
    }
}

fn log_device_info<D: CaptureDevice>(device: &D) {
    log::info!("*** DEVICE INFORMATION ***");
    match device.device_info() {
        Ok(info) if !info.is_empty() => {
            for (name, value) in info {
                log::info!("{}: {}", name, value);
            }
        }
        Ok(_) => log::info!("Device control information not available."),
        Err(e) => log::warn!("Failed to read device information: {}", e),
    }
}

/// Output path of frame `index` in a batch of `count`
#[must_use]
pub fn frame_path(output: &Path, index: usize, count: usize) -> PathBuf {
    if count == 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map_or_else(|| "frame".to_string(), |s| s.to_string_lossy().into_owned());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    output.with_file_name(name)
}

fn write_image(path: &Path, image: &Mat) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| Error::ImageWrite(format!("Non UTF-8 path {}", path.display())))?;
    if imgcodecs::imwrite(path_str, image, &Vector::new())? {
        Ok(())
    } else {
        Err(Error::ImageWrite(path.display().to_string()))
    }
}

/// Capture runtime backed by OpenCV `videoio`
pub struct VideoCaptureSystem {
    max_probe_devices: i32,
    open_timeout_ms: i32,
}

impl VideoCaptureSystem {
    /// Runtime probing capture indices `0..max_probe_devices`
    #[must_use]
    pub fn new(max_probe_devices: i32) -> Self {
        Self {
            max_probe_devices,
            open_timeout_ms: timeout_millis(DEFAULT_FRAME_TIMEOUT_MS),
        }
    }

    /// Runtime using the probe count and open deadline of `config`
    #[must_use]
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            max_probe_devices: config.max_probe_devices,
            open_timeout_ms: timeout_millis(config.frame_timeout_ms),
        }
    }

    fn open_params(&self) -> Vector<i32> {
        Vector::from_slice(&[CAP_PROP_OPEN_TIMEOUT_MSEC, self.open_timeout_ms])
    }
}

fn timeout_millis(ms: u64) -> i32 {
    i32::try_from(ms).unwrap_or(i32::MAX)
}

impl CaptureSystem for VideoCaptureSystem {
    type Device = VideoCaptureDevice;

    fn library_version(&self) -> String {
        format!(
            "OpenCV {}.{}.{}",
            opencv::core::CV_VERSION_MAJOR,
            opencv::core::CV_VERSION_MINOR,
            opencv::core::CV_VERSION_REVISION
        )
    }

    fn devices(&mut self) -> Result<Vec<VideoCaptureDevice>> {
        let mut devices = Vec::new();
        for index in 0..self.max_probe_devices {
            let capture = VideoCapture::new_with_params(index, videoio::CAP_ANY, &self.open_params())?;
            if capture.is_opened()? {
                log::debug!("Found capture device {}", index);
                devices.push(VideoCaptureDevice {
                    index,
                    capture,
                    open_params: self.open_params(),
                });
            }
        }
        Ok(devices)
    }

    fn release(&mut self) {
        log::debug!("Releasing video capture system");
    }
}

/// Camera opened through OpenCV `videoio`
pub struct VideoCaptureDevice {
    index: i32,
    capture: VideoCapture,
    open_params: Vector<i32>,
}

impl CaptureDevice for VideoCaptureDevice {
    fn device_info(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("DeviceIndex".to_string(), self.index.to_string()),
            ("Backend".to_string(), self.capture.get_backend_name()?),
            ("Width".to_string(), self.capture.get(CAP_PROP_FRAME_WIDTH)?.to_string()),
            ("Height".to_string(), self.capture.get(CAP_PROP_FRAME_HEIGHT)?.to_string()),
            ("FrameRate".to_string(), self.capture.get(CAP_PROP_FPS)?.to_string()),
        ])
    }

    fn init(&mut self, config: &CameraConfig) -> Result<()> {
        if !self.capture.is_opened()?
            && !self
                .capture
                .open_with_params(self.index, videoio::CAP_ANY, &self.open_params)?
        {
            return Err(Error::Camera(format!("Cannot open capture device {}", self.index)));
        }
        // Single buffered frame keeps frames fresh
        self.capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
        let read_timeout = f64::from(timeout_millis(config.frame_timeout_ms));
        if !self.capture.set(CAP_PROP_READ_TIMEOUT_MSEC, read_timeout)? {
            log::warn!(
                "Backend {} ignores the read timeout; a stalled device may block",
                self.capture.get_backend_name()?
            );
        }
        if let Some((width, height)) = config.resolution {
            self.capture.set(CAP_PROP_FRAME_WIDTH, f64::from(width))?;
            self.capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(height))?;
        }
        Ok(())
    }

    fn begin_acquisition(&mut self) -> Result<()> {
        if self.capture.is_opened()? {
            Ok(())
        } else {
            Err(Error::Camera(format!("Capture device {} is not open", self.index)))
        }
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let started = Instant::now();
        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image)?;
        frame_from_read(grabbed, image, started.elapsed(), timeout)
    }

    fn end_acquisition(&mut self) -> Result<()> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

/// Classify the outcome of a blocking read that took `elapsed`
///
/// A grabbed image is always kept, even when it arrived after `timeout`. A
/// failed read is a timeout once the deadline has passed and an incomplete
/// frame otherwise.
fn frame_from_read(grabbed: bool, image: Mat, elapsed: Duration, timeout: Duration) -> Result<Frame> {
    if grabbed && !image.empty() {
        if elapsed > timeout {
            log::warn!("Frame arrived after {:?}, past the {:?} deadline", elapsed, timeout);
        }
        return Ok(Frame::complete(image));
    }
    if elapsed >= timeout {
        return Err(Error::FrameTimeout(timeout));
    }
    Ok(Frame::incomplete(image, -1))
}
