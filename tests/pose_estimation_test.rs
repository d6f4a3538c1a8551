//! Head pose estimator tests with stand-in face and landmark models


use freefield_toolbox::{
    pose_estimation::{solve_head_pose, HeadPoseEstimator},
    Error,
};
use opencv::{
    core::{Point2f, Rect, Vec3d, Vector},
    imgcodecs,
};
use test_helpers::{create_test_image, project_template, FixedFaces, NoFaces, ProjectedTemplate};

fn turned_head() -> ProjectedTemplate {
    ProjectedTemplate {
        rotation_vec: Vec3d::from([0.1, -0.25, 0.05]),
        translation_vec: Vec3d::from([2.0, -1.0, 55.0]),
    }
}

#[test]
fn test_no_face_returns_none() {
    let image = create_test_image(480, 640).unwrap();
    let estimator = HeadPoseEstimator::new(NoFaces, turned_head());

    let pose = estimator.estimate(&image, false).unwrap();
    assert!(pose.is_none());
}

#[test]
fn test_estimate_matches_direct_solve() {
    let image = create_test_image(480, 640).unwrap();
    let predictor = turned_head();
    let landmarks = project_template(predictor.rotation_vec, predictor.translation_vec, 640, 480).unwrap();
    let expected = solve_head_pose(&landmarks, 640, 480).unwrap().pose;

    let estimator = HeadPoseEstimator::new(FixedFaces(vec![Rect::new(200, 120, 240, 240)]), predictor);
    let pose = estimator.estimate(&image, false).unwrap().expect("face should be found");

    assert!((pose.pitch - expected.pitch).abs() < 1e-6);
    assert!((pose.yaw - expected.yaw).abs() < 1e-6);
    assert!((pose.roll - expected.roll).abs() < 1e-6);
    assert!(pose.pitch.is_finite() && pose.yaw.is_finite() && pose.roll.is_finite());
}

#[test]
fn test_first_face_is_used() {
    let image = create_test_image(240, 320).unwrap();
    let faces = vec![Rect::new(10, 10, 100, 100), Rect::new(150, 50, 80, 80)];
    let estimator = HeadPoseEstimator::new(FixedFaces(faces), turned_head());
    assert!(estimator.estimate(&image, false).unwrap().is_some());
}

#[test]
fn test_estimate_from_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subject.png");
    let image = create_test_image(480, 640).unwrap();
    assert!(imgcodecs::imwrite(path.to_str().unwrap(), &image, &Vector::new()).unwrap());

    let estimator = HeadPoseEstimator::new(FixedFaces(vec![Rect::new(0, 0, 100, 100)]), turned_head());
    assert!(estimator.estimate_from_path(&path, false).unwrap().is_some());

    let no_face = HeadPoseEstimator::new(NoFaces, turned_head());
    assert!(no_face.estimate_from_path(&path, false).unwrap().is_none());
}

#[test]
fn test_missing_image_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let estimator = HeadPoseEstimator::new(NoFaces, turned_head());

    let result = estimator.estimate_from_path(dir.path().join("missing.png"), false);
    assert!(matches!(result, Err(Error::ImageRead(_))));
}

#[test]
fn test_wrong_landmark_count_is_rejected() {
    let landmarks = vec![Point2f::new(1.0, 1.0); 5];
    assert!(matches!(solve_head_pose(&landmarks, 640, 480), Err(Error::InvalidInput(_))));
}

#[test]
fn test_shared_estimator_serves_repeated_images() {
    let image = create_test_image(480, 640).unwrap();
    let estimator = HeadPoseEstimator::new(FixedFaces(vec![Rect::new(200, 120, 240, 240)]), turned_head());
    let shared = &estimator;

    let first = shared.estimate(&image, false).unwrap().unwrap();
    let second = shared.estimate(&image, false).unwrap().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_pose_serializes_angles() {
    let image = create_test_image(480, 640).unwrap();
    let estimator = HeadPoseEstimator::new(FixedFaces(vec![Rect::new(200, 120, 240, 240)]), turned_head());
    let pose = estimator.estimate(&image, false).unwrap().unwrap();

    let value: serde_yaml::Value = serde_yaml::from_str(&serde_yaml::to_string(&pose).unwrap()).unwrap();
    assert_eq!(value["pitch"].as_f64(), Some(pose.pitch));
    assert_eq!(value["yaw"].as_f64(), Some(pose.yaw));
    assert_eq!(value["roll"].as_f64(), Some(pose.roll));
}
