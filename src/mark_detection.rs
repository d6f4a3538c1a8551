use crate::{
    constants::{FACE_BOX_EXPANSION, LANDMARK_INPUT_SIZE, NUM_FACIAL_LANDMARKS},
    utils::image_conversion::{bgr_to_tensor, TensorLayout},
    utils::refine_box,
    Error, Result,
};
use ndarray::CowArray;
use opencv::core::{Mat, Point2f, Rect, Size};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Something that places the 68 facial landmarks inside a face box
pub trait LandmarkPredictor {
    /// Landmarks of the face in `face`, in full image coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the face region is empty or prediction fails
    fn predict(&self, image: &Mat, face: Rect) -> Result<Vec<Point2f>>;
}

/// Facial landmark detector using `ONNX` Runtime
pub struct OnnxLandmarkPredictor {
    session: Session,
    input_size: i32,
}

impl OnnxLandmarkPredictor {
    /// Load a 68-point landmark model from an `ONNX` file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX model file cannot be loaded
    /// - The ONNX runtime environment cannot be created
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!(
            "Initializing landmark predictor with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("mark_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.outputs.is_empty() {
            return Err(Error::ModelOutputError("Model has no outputs".to_string()));
        }

        Ok(Self {
            session,
            input_size: LANDMARK_INPUT_SIZE,
        })
    }

    fn forward(&self, crop: &Mat) -> Result<Vec<f32>> {
        let mut resized = Mat::default();
        imgproc::resize(
            crop,
            &mut resized,
            Size::new(self.input_size, self.input_size),
            0.0,
            0.0,
            InterpolationFlags::INTER_LINEAR as i32,
        )?;

        let inputs = bgr_to_tensor(&resized, 0.0, 255.0, TensorLayout::Nhwc)?;
        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let marks_output = outputs
            .first()
            .ok_or_else(|| Error::ModelOutputError("No output from model".to_string()))?;
        let marks: Vec<f32> = marks_output.try_extract::<f32>()?.view().iter().copied().collect();
        Ok(marks)
    }
}

impl LandmarkPredictor for OnnxLandmarkPredictor {
    fn predict(&self, image: &Mat, face: Rect) -> Result<Vec<Point2f>> {
        let region = refine_box(face, image.cols(), image.rows(), FACE_BOX_EXPANSION);
        if region.width <= 0 || region.height <= 0 {
            return Err(Error::InvalidInput(format!("Empty face region {face:?}")));
        }

        let crop = Mat::roi(image, region)?.try_clone()?;
        let marks = self.forward(&crop)?;
        scale_marks(&marks, region, self.input_size)
    }
}

/// Map model-space marks of a `input_size` square onto `region` of the image
#[allow(clippy::cast_precision_loss)] // Precision loss acceptable for pixel coordinates
fn scale_marks(marks: &[f32], region: Rect, input_size: i32) -> Result<Vec<Point2f>> {
    if marks.len() < NUM_FACIAL_LANDMARKS * 2 {
        return Err(Error::ModelOutputError(format!(
            "Expected {} landmark coordinates, got {}",
            NUM_FACIAL_LANDMARKS * 2,
            marks.len()
        )));
    }

    let sx = region.width as f32 / input_size as f32;
    let sy = region.height as f32 / input_size as f32;
    Ok(marks
        .chunks_exact(2)
        .take(NUM_FACIAL_LANDMARKS)
        .map(|xy| Point2f::new(region.x as f32 + xy[0] * sx, region.y as f32 + xy[1] * sy))
        .collect())
}
