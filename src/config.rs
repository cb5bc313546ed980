use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluator::{PostureEvaluator, DEFAULT_MIN_VISIBILITY};
use crate::rules::{PoseCatalog, RuleSet, EXTENDED_SIDE_ANGLE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model_path: PathBuf,
    pub intra_threads: i16,
    pub min_detection_confidence: f32,
    pub min_visibility: f32,
    pub detection_timeout_ms: u64,
    pub pose: String,
    /// Extra rule sets, merged over the built-in ones.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub poses: BTreeMap<String, RuleSet>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/pose_landmarks_detector.onnx"),
            intra_threads: 4,
            min_detection_confidence: 0.5,
            min_visibility: DEFAULT_MIN_VISIBILITY,
            detection_timeout_ms: 1000,
            pose: EXTENDED_SIDE_ANGLE.to_string(),
            poses: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn catalog(&self) -> PoseCatalog {
        let mut catalog = PoseCatalog::builtin();
        catalog.extend(self.poses.clone());
        catalog
    }

    /// Evaluator for the configured pose, or for `pose_override` if given.
    pub fn evaluator(&self, pose_override: Option<&str>) -> Result<PostureEvaluator> {
        let pose = pose_override.unwrap_or(&self.pose);
        Ok(PostureEvaluator::for_pose(&self.catalog(), pose)?
            .with_min_visibility(self.min_visibility))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rules::{AlignmentRule, RuleCheck};
    use crate::pose_landmarks::BodyPart;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posetracking.toml");

        let mut config = Config::default();
        config.detection_timeout_ms = 250;
        config.poses.insert(
            "mountain".to_string(),
            RuleSet {
                name: "Mountain".to_string(),
                rules: vec![AlignmentRule::new(
                    "shoulders",
                    "Relax your shoulders.",
                    RuleCheck::Level {
                        left: BodyPart::LeftShoulder,
                        right: BodyPart::RightShoulder,
                        max_delta: 0.05,
                    },
                )],
            },
        );
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.detection_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = toml::from_str("pose = \"extended_side_angle\"\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn configured_pose_is_selected() {
        let text = r#"
            pose = "chair"
            min_visibility = 0.6

            [poses.chair]
            name = "Chair"

            [[poses.chair.rules]]
            id = "knees"
            message = "Sit deeper."
            check = { kind = "angle_at_least", first = "left_hip", vertex = "left_knee", last = "left_ankle", min = 100.0 }
        "#;
        let config: Config = toml::from_str(text).unwrap();
        let evaluator = config.evaluator(None).unwrap();
        assert_eq!(evaluator.pose_id(), "chair");
        assert_eq!(evaluator.min_visibility(), 0.6);
        assert_eq!(evaluator.rules().rules[0].id, "knees");

        let builtin = config.evaluator(Some(EXTENDED_SIDE_ANGLE)).unwrap();
        assert_eq!(builtin.rules().rules.len(), 4);
    }

    #[test]
    fn unknown_pose_fails() {
        let config = Config {
            pose: "crow".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.evaluator(None), Err(Error::UnknownPose(_))));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "detection_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
