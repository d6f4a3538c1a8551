use crate::{
    constants::{IMAGE_NORMALIZATION_OFFSET, IMAGE_NORMALIZATION_SCALE},
    utils::image_conversion::{bgr_to_tensor, TensorLayout},
    utils::safe_cast::f32_to_i32_clamp,
    Error, Result,
};
use ndarray::CowArray;
use opencv::core::{Mat, Rect, Scalar, Size};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Something that finds faces in an image
pub trait FaceLocator {
    /// Face bounding boxes in image coordinates, most confident first
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying detector fails. An image without
    /// faces is not an error and yields an empty vector.
    fn locate(&self, image: &Mat) -> Result<Vec<Rect>>;
}

/// Face detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    /// Bounding box of the detected face
    pub bbox: Rect,
    /// Confidence score of the detection
    pub score: f32,
}

/// Decoded box candidate in model input coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1 + 1.0) * (self.y2 - self.y1 + 1.0)
    }

    fn iou(&self, other: &Self) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1) + 1.0).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1) + 1.0).max(0.0);
        let inter = w * h;
        inter / (self.area() + other.area() - inter)
    }
}

/// SCRFD face detector using ONNX Runtime
pub struct OnnxFaceLocator {
    session: Session,
    input_size: (i32, i32),
    conf_threshold: f32,
    nms_threshold: f32,
    num_anchors: usize,
    strides: Vec<i32>,
    offset: usize,
}

impl OnnxFaceLocator {
    /// Load an SCRFD detector from an ONNX model file
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or has no inputs
    pub fn new<P: AsRef<Path>>(model_path: P, conf_threshold: f32, nms_threshold: f32) -> Result<Self> {
        log::info!(
            "Initializing face detector with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        let input_meta = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelError("Model has no inputs".to_string()))?;

        // [batch, channels, height, width], dynamic axes fall back to 640
        let dim = |idx: usize| {
            input_meta
                .dimensions
                .get(idx)
                .copied()
                .flatten()
                .and_then(|d| i32::try_from(d).ok())
                .unwrap_or(640)
        };
        let input_size = (dim(3), dim(2));

        let (offset, strides, num_anchors) = match session.outputs.len() {
            6 | 9 => (3, vec![8, 16, 32], 2),
            10 | 15 => (5, vec![8, 16, 32, 64, 128], 1),
            n => {
                log::warn!("Unknown detector layout with {} outputs, assuming 3 strides", n);
                (3, vec![8, 16, 32], 2)
            }
        };

        Ok(Self {
            session,
            input_size,
            conf_threshold,
            nms_threshold,
            num_anchors,
            strides,
            offset,
        })
    }

    /// Detect faces with their confidence scores
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn detect(&self, image: &Mat) -> Result<Vec<FaceDetection>> {
        let (input_width, input_height) = self.input_size;

        // Letterbox: keep aspect ratio, pad right/bottom with black
        let ratio_img = image.rows() as f32 / image.cols() as f32;
        let ratio_model = input_height as f32 / input_width as f32;
        let (new_width, new_height) = if ratio_img > ratio_model {
            ((input_height as f32 / ratio_img) as i32, input_height)
        } else {
            (input_width, (input_width as f32 * ratio_img) as i32)
        };
        let det_scale = new_height as f32 / image.rows() as f32;

        let mut resized = Mat::default();
        imgproc::resize(
            image,
            &mut resized,
            Size::new(new_width, new_height),
            0.0,
            0.0,
            InterpolationFlags::INTER_LINEAR as i32,
        )?;

        let mut det_img =
            Mat::new_rows_cols_with_default(input_height, input_width, opencv::core::CV_8UC3, Scalar::all(0.0))?;
        {
            let mut roi = det_img.roi_mut(Rect::new(0, 0, new_width, new_height))?;
            resized.copy_to(&mut roi)?;
        }

        let inputs = bgr_to_tensor(
            &det_img,
            IMAGE_NORMALIZATION_OFFSET,
            IMAGE_NORMALIZATION_SCALE,
            TensorLayout::Nchw,
        )?;
        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut candidates = Vec::new();
        for (idx, &stride) in self.strides.iter().enumerate() {
            let bbox_idx = idx + self.offset;
            if bbox_idx >= outputs.len() {
                return Err(Error::ModelOutputError(format!(
                    "Missing bbox output {bbox_idx} for stride {stride}"
                )));
            }
            let scores: Vec<f32> = outputs[idx].try_extract::<f32>()?.view().iter().copied().collect();
            let distances: Vec<f32> = outputs[bbox_idx].try_extract::<f32>()?.view().iter().copied().collect();

            candidates.extend(decode_stride(
                &scores,
                &distances,
                stride,
                (input_width / stride, input_height / stride),
                self.num_anchors,
                self.conf_threshold,
            ));
        }

        let max_width = image.cols();
        let max_height = image.rows();
        let detections = non_max_suppression(candidates, self.nms_threshold)
            .into_iter()
            .map(|c| {
                let x1 = f32_to_i32_clamp(c.x1 / det_scale, 0, max_width);
                let y1 = f32_to_i32_clamp(c.y1 / det_scale, 0, max_height);
                let x2 = f32_to_i32_clamp(c.x2 / det_scale, 0, max_width);
                let y2 = f32_to_i32_clamp(c.y2 / det_scale, 0, max_height);
                FaceDetection {
                    bbox: Rect::new(x1, y1, x2 - x1, y2 - y1),
                    score: c.score,
                }
            })
            .collect::<Vec<_>>();

        log::debug!("Detected {} faces", detections.len());
        Ok(detections)
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, image: &Mat) -> Result<Vec<Rect>> {
        Ok(self.detect(image)?.into_iter().map(|d| d.bbox).collect())
    }
}

/// Decode one stride level of SCRFD output into thresholded candidates
///
/// `distances` holds `(left, top, right, bottom)` per anchor in stride units.
#[allow(clippy::cast_precision_loss)]
fn decode_stride(
    scores: &[f32],
    distances: &[f32],
    stride: i32,
    (grid_width, grid_height): (i32, i32),
    num_anchors: usize,
    threshold: f32,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let stride_f = stride as f32;
    let mut anchor = 0usize;

    for y in 0..grid_height {
        for x in 0..grid_width {
            let cx = (x * stride) as f32;
            let cy = (y * stride) as f32;
            for _ in 0..num_anchors {
                let (Some(&score), Some(dist)) = (scores.get(anchor), distances.get(anchor * 4..anchor * 4 + 4)) else {
                    return candidates;
                };
                if score >= threshold {
                    candidates.push(Candidate {
                        x1: cx - dist[0] * stride_f,
                        y1: cy - dist[1] * stride_f,
                        x2: cx + dist[2] * stride_f,
                        y2: cy + dist[3] * stride_f,
                        score,
                    });
                }
                anchor += 1;
            }
        }
    }

    candidates
}

/// Greedy non-maximum suppression, result sorted by descending score
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Candidate {
        Candidate { x1, y1, x2, y2, score }
    }

    #[test]
    fn test_iou() {
        let a = candidate(0.0, 0.0, 9.0, 9.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);

        let far = candidate(100.0, 100.0, 109.0, 109.0, 1.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let kept = non_max_suppression(
            vec![
                candidate(0.0, 0.0, 10.0, 10.0, 0.6),
                candidate(1.0, 1.0, 11.0, 11.0, 0.9),
                candidate(50.0, 50.0, 60.0, 60.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn test_decode_stride_thresholds_and_scales() {
        // 2x1 grid, one anchor per cell, stride 8
        let scores = [0.2, 0.8];
        let distances = [1.0, 1.0, 1.0, 1.0, 0.5, 1.0, 2.0, 1.0];
        let decoded = decode_stride(&scores, &distances, 8, (2, 1), 1, 0.5);

        assert_eq!(decoded.len(), 1);
        let c = decoded[0];
        assert_eq!(c.x1, 8.0 - 4.0);
        assert_eq!(c.y1, -8.0);
        assert_eq!(c.x2, 8.0 + 16.0);
        assert_eq!(c.y2, 8.0);
    }

    #[test]
    fn test_decode_stride_short_output() {
        // Fewer scores than anchors must not panic
        let decoded = decode_stride(&[0.9], &[1.0, 1.0, 1.0, 1.0], 8, (4, 4), 2, 0.5);
        assert_eq!(decoded.len(), 1);
    }
}
