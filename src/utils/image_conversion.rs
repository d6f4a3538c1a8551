//! Pixel format conversion and OpenCV Mat to ndarray tensor conversion.

use crate::{utils::safe_cast::i32_to_usize, Error, Result};
use ndarray::Array4;
use opencv::core::{Mat, Vec3f, CV_32F, CV_8U};
use opencv::imgproc;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

/// Pixel format of saved camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit single channel grayscale
    #[default]
    Mono8,
    /// 8-bit three channel BGR
    Bgr8,
}

/// Memory layout of a model input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// Batch, channels, height, width
    Nchw,
    /// Batch, height, width, channels
    Nhwc,
}

/// Convert a frame with 1, 3 or 4 channels of any depth to `format`
///
/// # Errors
///
/// Returns an error if the channel count is unsupported or OpenCV fails
pub fn convert_pixel_format(image: &Mat, format: PixelFormat) -> Result<Mat> {
    let eight_bit = if image.depth() == CV_8U {
        image.try_clone()?
    } else {
        let mut converted = Mat::default();
        image.convert_to(&mut converted, CV_8U, 1.0, 0.0)?;
        converted
    };

    let code = match (eight_bit.channels(), format) {
        (1, PixelFormat::Mono8) | (3, PixelFormat::Bgr8) => return Ok(eight_bit),
        (1, PixelFormat::Bgr8) => imgproc::COLOR_GRAY2BGR,
        (3, PixelFormat::Mono8) => imgproc::COLOR_BGR2GRAY,
        (4, PixelFormat::Mono8) => imgproc::COLOR_BGRA2GRAY,
        (4, PixelFormat::Bgr8) => imgproc::COLOR_BGRA2BGR,
        (channels, _) => {
            return Err(Error::InvalidInput(format!(
                "Cannot convert {channels}-channel frame to {format:?}"
            )))
        }
    };

    let mut output = Mat::default();
    imgproc::cvt_color(&eight_bit, &mut output, code, 0)?;
    Ok(output)
}

/// Convert a BGR image to a normalized single-image RGB tensor
///
/// Each channel value becomes `(value - offset) / scale`.
///
/// # Errors
///
/// Returns an error if the image is empty, not three-channel, or OpenCV fails
pub fn bgr_to_tensor(image: &Mat, offset: f32, scale: f32, layout: TensorLayout) -> Result<Array4<f32>> {
    if image.empty() || image.channels() != 3 {
        return Err(Error::InvalidInput(format!(
            "Expected non-empty 3-channel image, got {}x{}x{}",
            image.rows(),
            image.cols(),
            image.channels()
        )));
    }

    let mut rgb_image = Mat::default();
    imgproc::cvt_color(image, &mut rgb_image, imgproc::COLOR_BGR2RGB, 0)?;

    let mut float_image = Mat::default();
    rgb_image.convert_to(&mut float_image, CV_32F, 1.0, 0.0)?;

    let height = i32_to_usize(float_image.rows())?;
    let width = i32_to_usize(float_image.cols())?;
    let channels = 3;

    let mut data = Vec::with_capacity(height * width * channels);
    for row in 0..float_image.rows() {
        for col in 0..float_image.cols() {
            let pixel = float_image.at_2d::<Vec3f>(row, col)?;
            for ch in 0..channels {
                data.push((pixel[ch] - offset) / scale);
            }
        }
    }

    let array = Array4::from_shape_vec((1, height, width, channels), data)
        .map_err(|e| Error::ModelError(format!("Failed to create array: {e}")))?;

    Ok(match layout {
        TensorLayout::Nhwc => array,
        TensorLayout::Nchw => array.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_16UC1, CV_8UC1, CV_8UC3};

    #[test]
    fn test_bgr_frame_to_mono() {
        let frame = Mat::new_rows_cols_with_default(4, 6, CV_8UC3, Scalar::new(10.0, 10.0, 10.0, 0.0)).unwrap();
        let mono = convert_pixel_format(&frame, PixelFormat::Mono8).unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.rows(), 4);
        assert_eq!(mono.cols(), 6);
        assert_eq!(*mono.at_2d::<u8>(0, 0).unwrap(), 10);
    }

    #[test]
    fn test_mono_frame_passthrough() {
        let frame = Mat::new_rows_cols_with_default(2, 2, CV_8UC1, Scalar::all(7.0)).unwrap();
        let mono = convert_pixel_format(&frame, PixelFormat::Mono8).unwrap();
        assert_eq!(mono.typ(), CV_8UC1);

        let bgr = convert_pixel_format(&frame, PixelFormat::Bgr8).unwrap();
        assert_eq!(bgr.channels(), 3);
    }

    #[test]
    fn test_sixteen_bit_frame_is_narrowed() {
        let frame = Mat::new_rows_cols_with_default(2, 2, CV_16UC1, Scalar::all(100.0)).unwrap();
        let mono = convert_pixel_format(&frame, PixelFormat::Mono8).unwrap();
        assert_eq!(mono.depth(), CV_8U);
    }

    #[test]
    fn test_tensor_layouts() {
        // BGR (0, 0, 255) is pure red, so the first RGB channel carries the value
        let image = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::new(0.0, 0.0, 255.0, 0.0)).unwrap();

        let nhwc = bgr_to_tensor(&image, 0.0, 255.0, TensorLayout::Nhwc).unwrap();
        assert_eq!(nhwc.shape(), &[1, 2, 3, 3]);
        assert!((nhwc[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(nhwc[[0, 0, 0, 2]], 0.0);

        let nchw = bgr_to_tensor(&image, 0.0, 255.0, TensorLayout::Nchw).unwrap();
        assert_eq!(nchw.shape(), &[1, 3, 2, 3]);
        assert!(nchw.is_standard_layout());
        assert!((nchw[[0, 0, 1, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tensor_rejects_gray() {
        let image = Mat::new_rows_cols_with_default(2, 2, CV_8UC1, Scalar::all(0.0)).unwrap();
        assert!(bgr_to_tensor(&image, 0.0, 1.0, TensorLayout::Nchw).is_err());
    }
}
