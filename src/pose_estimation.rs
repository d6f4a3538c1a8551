use crate::{
    config::Config,
    constants::{CAMERA_CENTER_FACTOR, NUM_DISTORTION_COEFFS, NUM_FACIAL_LANDMARKS, NUM_POSE_ANCHORS},
    face_detection::{FaceLocator, OnnxFaceLocator},
    mark_detection::{LandmarkPredictor, OnnxLandmarkPredictor},
    utils::safe_cast::f32_to_i32_clamp,
    Error, Result,
};
use opencv::{
    calib3d,
    core::{self, Mat, Point, Point2f, Point3f, Scalar, Vec3d, Vector},
    highgui, imgcodecs,
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};
use serde::Serialize;
use std::path::Path;

/// Generic 3D face model, one point per entry of [`POSE_LANDMARK_INDICES`]
pub const FACE_TEMPLATE: [[f32; 3]; NUM_POSE_ANCHORS] = [
    [6.825_897, 6.760_612, 4.402_142],
    [1.330_353, 7.122_144, 6.903_745],
    [-1.330_353, 7.122_144, 6.903_745],
    [-6.825_897, 6.760_612, 4.402_142],
    [5.311_432, 5.485_328, 3.987_654],
    [1.789_930, 5.393_625, 4.413_414],
    [-1.789_930, 5.393_625, 4.413_414],
    [-5.311_432, 5.485_328, 3.987_654],
    [2.005_628, 1.409_845, 6.165_652],
    [-2.005_628, 1.409_845, 6.165_652],
    [2.774_015, -2.080_775, 5.048_531],
    [-2.774_015, -2.080_775, 5.048_531],
    [0.000_000, -3.116_408, 6.097_667],
    [0.000_000, -7.415_691, 4.070_434],
];

/// Landmarks matched against [`FACE_TEMPLATE`]: eyebrow corners, eye corners,
/// nose edges, mouth corners, lower lip and chin
pub const POSE_LANDMARK_INDICES: [usize; NUM_POSE_ANCHORS] = [17, 21, 22, 26, 36, 39, 42, 45, 31, 35, 48, 54, 57, 8];

/// Cube drawn around the head in the debug overlay
const OVERLAY_CUBOID: [[f32; 3]; 8] = [
    [10.0, 10.0, 10.0],
    [10.0, 10.0, -10.0],
    [10.0, -10.0, -10.0],
    [10.0, -10.0, 10.0],
    [-10.0, 10.0, 10.0],
    [-10.0, 10.0, -10.0],
    [-10.0, -10.0, -10.0],
    [-10.0, -10.0, 10.0],
];

/// Head orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPose {
    /// Rotation about the camera x axis
    pub pitch: f64,
    /// Rotation about the camera y axis
    pub yaw: f64,
    /// Rotation about the camera z axis
    pub roll: f64,
}

/// Pinhole camera approximated from the image size
///
/// The focal length is the image width, the optical center is the image
/// center and lens distortion is zero.
pub struct CameraIntrinsics {
    camera_matrix: Mat,
    dist_coeffs: Mat,
}

impl CameraIntrinsics {
    /// Intrinsics for a `width` × `height` image
    ///
    /// # Errors
    ///
    /// Returns an error if OpenCV matrix allocation fails
    pub fn for_image(width: i32, height: i32) -> Result<Self> {
        let focal_length = f64::from(width);
        let center = (
            f64::from(width) / CAMERA_CENTER_FACTOR,
            f64::from(height) / CAMERA_CENTER_FACTOR,
        );
        let values: [[f64; 3]; 3] = [
            [focal_length, 0.0, center.0],
            [0.0, focal_length, center.1],
            [0.0, 0.0, 1.0],
        ];

        let mut camera_matrix = Mat::zeros(3, 3, core::CV_64F)?.to_mat()?;
        for (i, row) in (0..).zip(values.iter()) {
            for (j, &value) in (0..).zip(row.iter()) {
                *camera_matrix.at_2d_mut::<f64>(i, j)? = value;
            }
        }

        let dist_coeffs = Mat::zeros(NUM_DISTORTION_COEFFS, 1, core::CV_64F)?.to_mat()?;

        Ok(Self {
            camera_matrix,
            dist_coeffs,
        })
    }

    /// 3×3 camera matrix
    #[must_use]
    pub fn camera_matrix(&self) -> &Mat {
        &self.camera_matrix
    }

    /// Distortion coefficients (all zero)
    #[must_use]
    pub fn dist_coeffs(&self) -> &Mat {
        &self.dist_coeffs
    }
}

/// Result of a successful perspective-n-point solve
pub struct PoseSolution {
    /// Euler angles extracted from the pose matrix
    pub pose: HeadPose,
    /// Rodrigues rotation vector
    pub rotation_vec: Vec3d,
    /// Translation vector in template units
    pub translation_vec: Vec3d,
    /// Camera the solve was performed with
    pub intrinsics: CameraIntrinsics,
}

/// Pick the template anchors out of a full 68-point landmark set
///
/// # Errors
///
/// Returns an error if `landmarks` does not hold exactly 68 points
pub fn anchor_points(landmarks: &[Point2f]) -> Result<Vector<Point2f>> {
    if landmarks.len() != NUM_FACIAL_LANDMARKS {
        return Err(Error::InvalidInput(format!(
            "Expected {} landmarks, got {}",
            NUM_FACIAL_LANDMARKS,
            landmarks.len()
        )));
    }
    Ok(POSE_LANDMARK_INDICES.iter().map(|&idx| landmarks[idx]).collect())
}

/// Template points as an OpenCV vector
#[must_use]
pub fn template_points() -> Vector<Point3f> {
    FACE_TEMPLATE.iter().map(|p| Point3f::new(p[0], p[1], p[2])).collect()
}

/// Estimate head pose from 68 landmarks found in a `width` × `height` image
///
/// # Errors
///
/// Returns an error if:
/// - The number of landmarks is not exactly 68
/// - The PnP solver fails
/// - OpenCV operations fail
pub fn solve_head_pose(landmarks: &[Point2f], width: i32, height: i32) -> Result<PoseSolution> {
    let image_points = anchor_points(landmarks)?;
    let object_points = template_points();
    let intrinsics = CameraIntrinsics::for_image(width, height)?;

    let mut rvec = Mat::default();
    let mut tvec = Mat::default();
    let solved = calib3d::solve_pnp(
        &object_points,
        &image_points,
        intrinsics.camera_matrix(),
        intrinsics.dist_coeffs(),
        &mut rvec,
        &mut tvec,
        false,
        calib3d::SOLVEPNP_ITERATIVE,
    )?;
    if !solved {
        return Err(Error::PoseSolve("solvePnP found no solution".to_string()));
    }

    let mut rotation_matrix = Mat::default();
    calib3d::rodrigues(&rvec, &mut rotation_matrix, &mut Mat::default())?;

    let mut pose_matrix = Mat::default();
    core::hconcat2(&rotation_matrix, &tvec, &mut pose_matrix)?;

    let mut euler_angles = Mat::default();
    calib3d::decompose_projection_matrix(
        &pose_matrix,
        &mut Mat::default(),
        &mut Mat::default(),
        &mut Mat::default(),
        &mut Mat::default(),
        &mut Mat::default(),
        &mut Mat::default(),
        &mut euler_angles,
    )?;

    let pose = HeadPose {
        pitch: *euler_angles.at_2d::<f64>(0, 0)?,
        yaw: *euler_angles.at_2d::<f64>(1, 0)?,
        roll: *euler_angles.at_2d::<f64>(2, 0)?,
    };
    log::debug!("Solved head pose {:?}", pose);

    Ok(PoseSolution {
        pose,
        rotation_vec: Vec3d::from([*rvec.at_2d::<f64>(0, 0)?, *rvec.at_2d::<f64>(1, 0)?, *rvec.at_2d::<f64>(2, 0)?]),
        translation_vec: Vec3d::from([*tvec.at_2d::<f64>(0, 0)?, *tvec.at_2d::<f64>(1, 0)?, *tvec.at_2d::<f64>(2, 0)?]),
        intrinsics,
    })
}

fn to_pixel(point: Point2f) -> Point {
    Point::new(
        f32_to_i32_clamp(point.x, i32::MIN, i32::MAX),
        f32_to_i32_clamp(point.y, i32::MIN, i32::MAX),
    )
}

/// Draw the projected cuboid, the landmarks and the angle labels onto `image`
///
/// # Errors
///
/// Returns an error if point projection or drawing fails
pub fn draw_pose_overlay(image: &mut Mat, solution: &PoseSolution, landmarks: &[Point2f]) -> Result<()> {
    let cuboid: Vector<Point3f> = OVERLAY_CUBOID.iter().map(|p| Point3f::new(p[0], p[1], p[2])).collect();
    let mut projected = Vector::<Point2f>::new();
    calib3d::project_points(
        &cuboid,
        &solution.rotation_vec,
        &solution.translation_vec,
        solution.intrinsics.camera_matrix(),
        solution.intrinsics.dist_coeffs(),
        &mut projected,
        &mut Mat::default(),
        0.0,
    )?;
    let corners: Vec<Point> = projected.iter().map(to_pixel).collect();

    let edge_color = Scalar::new(0.0, 255.0, 0.0, 0.0);
    for i in 0..4 {
        let j = (i + 1) % 4;
        for (a, b) in [(i, j), (i + 4, j + 4), (i, i + 4)] {
            if let (Some(&from), Some(&to)) = (corners.get(a), corners.get(b)) {
                imgproc::line(image, from, to, edge_color, 1, imgproc::LINE_AA, 0)?;
            }
        }
    }

    for &mark in landmarks {
        imgproc::circle(image, to_pixel(mark), 1, Scalar::new(0.0, 0.0, 255.0, 0.0), -1, LINE_8, 0)?;
    }

    let labels = [
        ("X", solution.pose.pitch, 20),
        ("Y", solution.pose.yaw, 50),
        ("Z", solution.pose.roll, 80),
    ];
    for (axis, angle, y) in labels {
        imgproc::put_text(
            image,
            &format!("{axis}: {angle:7.2}"),
            Point::new(20, y),
            FONT_HERSHEY_SIMPLEX,
            0.75,
            Scalar::all(0.0),
            2,
            LINE_8,
            false,
        )?;
    }

    Ok(())
}

/// Head pose estimator owning its face locator and landmark predictor
pub struct HeadPoseEstimator<L, P> {
    locator: L,
    predictor: P,
}

impl HeadPoseEstimator<OnnxFaceLocator, OnnxLandmarkPredictor> {
    /// Load the ONNX detector and landmark models named in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if either model cannot be loaded
    pub fn from_config(config: &Config) -> Result<Self> {
        let locator = OnnxFaceLocator::new(
            &config.models.face_detector,
            config.face_detection.confidence_threshold,
            config.face_detection.nms_threshold,
        )?;
        let predictor = OnnxLandmarkPredictor::new(&config.models.face_landmarks)?;
        Ok(Self::new(locator, predictor))
    }
}

impl<L: FaceLocator, P: LandmarkPredictor> HeadPoseEstimator<L, P> {
    /// Create an estimator from its two models
    pub fn new(locator: L, predictor: P) -> Self {
        Self { locator, predictor }
    }

    /// Estimate the pose of the first face found in `image`
    ///
    /// Returns `Ok(None)` when no face is detected. With `plot` set, the
    /// overlay is shown in a window and the call blocks until a key is pressed.
    ///
    /// # Errors
    ///
    /// Returns an error if detection, landmark prediction or the pose solve fails
    pub fn estimate(&self, image: &Mat, plot: bool) -> Result<Option<HeadPose>> {
        let faces = self.locator.locate(image)?;
        let Some(&face) = faces.first() else {
            log::warn!("No face detected in image");
            return Ok(None);
        };

        let landmarks = self.predictor.predict(image, face)?;
        let solution = solve_head_pose(&landmarks, image.cols(), image.rows())?;

        if plot {
            let mut overlay = image.try_clone()?;
            draw_pose_overlay(&mut overlay, &solution, &landmarks)?;
            highgui::imshow("Head Pose", &overlay)?;
            highgui::wait_key(0)?;
        }

        Ok(Some(solution.pose))
    }

    /// Read an image file and estimate the pose of its first face
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageRead`] if the file is missing or not an image
    pub fn estimate_from_path<Q: AsRef<Path>>(&self, path: Q, plot: bool) -> Result<Option<HeadPose>> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::ImageRead(format!("Non UTF-8 path {}", path.display())))?;
        let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            return Err(Error::ImageRead(path.display().to_string()));
        }
        log::info!("Estimating head pose in {}", path.display());
        self.estimate(&image, plot)
    }
}
