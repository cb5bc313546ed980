//! Error types shared by the landmark, acquisition and configuration layers.
//!
//! Evaluation itself never fails: missing keypoints and degenerate geometry
//! are handled by skipping rules, so nothing in here is produced by
//! [`crate::evaluator::PostureEvaluator::evaluate`].

/// Errors produced by the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("unknown pose: {0}")]
    UnknownPose(String),

    #[error("landmark detection failed: {0}")]
    Detection(String),

    #[error("acquisition worker stopped")]
    WorkerStopped,
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;
