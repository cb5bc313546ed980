//! Pose landmark acquisition and alignment feedback.
//!
//! Frames go through a [`pose_landmarks::PoseLandmarksModel`] (normally the
//! MediaPipe landmark network, driven by [`acquisition::FrameAcquisition`]),
//! and the resulting [`pose_landmarks::PoseSnapshot`] is judged by a
//! [`evaluator::PostureEvaluator`] against the rule set of a target pose.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod geometry;
pub mod overlay;
pub mod pose_landmarks;
pub mod rules;
pub mod utils;

pub use error::{Error, Result};
pub use evaluator::{EvaluationResult, PostureEvaluator, Violation};
pub use pose_landmarks::{BodyPart, Keypoint, PoseLandmarksModel, PoseSnapshot};
pub use rules::{AlignmentRule, PoseCatalog, RuleCheck, RuleSet};
