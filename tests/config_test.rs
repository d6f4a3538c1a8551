//! Configuration file tests

use freefield_toolbox::{config::Config, utils::image_conversion::PixelFormat, Error};

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("freefield.yaml");

    let mut config = Config::default();
    config.camera.pixel_format = PixelFormat::Bgr8;
    config.camera.resolution = Some((1280, 1024));
    config.pose.plot = true;
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.camera, config.camera);
    assert!(loaded.pose.plot);
    loaded.validate().unwrap();
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::from_file(dir.path().join("absent.yaml"));
    match result {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("Expected Io error, got {other:?}"),
    }
}

#[test]
fn test_unwritable_config_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing_dir").join("freefield.yaml");
    assert!(matches!(Config::default().to_file(&path), Err(Error::Io(_))));
}

#[test]
fn test_malformed_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "camera: [not, a, map]\n").unwrap();
    assert!(matches!(Config::from_file(&path), Err(Error::ConfigError(_))));
}

#[test]
fn test_missing_models_are_reported() {
    let mut config = Config::default();
    config.models.face_detector = "does/not/exist.onnx".into();
    match config.validate_models() {
        Err(Error::ConfigError(msg)) => assert!(msg.contains("Face detector")),
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}
