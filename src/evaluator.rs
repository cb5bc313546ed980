//! Applies a pose's rule set to one frame of landmarks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pose_landmarks::{BodyPart, PoseSnapshot};
use crate::rules::{PoseCatalog, RuleSet, EXTENDED_SIDE_ANGLE};

/// Keypoints below this visibility are treated as absent.
pub const DEFAULT_MIN_VISIBILITY: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub message: String,
}

/// Verdict for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub pose: String,
    /// Fired rules, in rule order.
    pub violations: Vec<Violation>,
    pub is_correct: bool,
    /// Mean visibility of the keypoints the evaluated rules read; 0 when
    /// nothing could be evaluated.
    pub confidence: f32,
    pub evaluated_rules: Vec<String>,
    pub skipped_rules: Vec<String>,
}

impl EvaluationResult {
    pub fn feedback(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.message.as_str())
    }
}

/// Stateless evaluator bound to a single rule set.
#[derive(Debug, Clone)]
pub struct PostureEvaluator {
    pose_id: String,
    rules: RuleSet,
    min_visibility: f32,
}

impl Default for PostureEvaluator {
    fn default() -> Self {
        Self::new(EXTENDED_SIDE_ANGLE, RuleSet::extended_side_angle())
    }
}

impl PostureEvaluator {
    pub fn new(pose_id: impl Into<String>, rules: RuleSet) -> Self {
        Self {
            pose_id: pose_id.into(),
            rules,
            min_visibility: DEFAULT_MIN_VISIBILITY,
        }
    }

    /// Selects the rule set for `pose_id` from `catalog`.
    pub fn for_pose(catalog: &PoseCatalog, pose_id: &str) -> Result<Self> {
        let rules = catalog
            .get(pose_id)
            .ok_or_else(|| Error::UnknownPose(pose_id.to_string()))?;
        Ok(Self::new(pose_id, rules.clone()))
    }

    pub fn with_min_visibility(mut self, min_visibility: f32) -> Self {
        self.min_visibility = min_visibility;
        self
    }

    pub fn pose_id(&self) -> &str {
        &self.pose_id
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn min_visibility(&self) -> f32 {
        self.min_visibility
    }

    pub fn evaluate(&self, snapshot: &PoseSnapshot) -> EvaluationResult {
        let mut violations = Vec::new();
        let mut evaluated_rules = Vec::new();
        let mut skipped_rules = Vec::new();
        let mut used_parts = BTreeSet::<BodyPart>::new();

        for rule in &self.rules.rules {
            match rule.check.fires(snapshot, self.min_visibility) {
                Some(fired) => {
                    used_parts.extend(rule.required_parts());
                    evaluated_rules.push(rule.id.clone());
                    if fired {
                        violations.push(Violation {
                            rule_id: rule.id.clone(),
                            message: rule.message.clone(),
                        });
                    }
                }
                None => {
                    debug!(rule = %rule.id, "skipping rule, keypoints unavailable");
                    skipped_rules.push(rule.id.clone());
                }
            }
        }

        let visibilities: Vec<f32> = used_parts
            .iter()
            .filter_map(|part| snapshot.get(*part))
            .map(|keypoint| keypoint.visibility)
            .collect();
        let confidence = if visibilities.is_empty() {
            0.0
        } else {
            visibilities.iter().sum::<f32>() / visibilities.len() as f32
        };

        debug!(
            pose = %self.pose_id,
            violations = violations.len(),
            skipped = skipped_rules.len(),
            confidence,
            "evaluated snapshot"
        );

        EvaluationResult {
            pose: self.pose_id.clone(),
            is_correct: violations.is_empty(),
            violations,
            confidence,
            evaluated_rules,
            skipped_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose_landmarks::Keypoint;

    #[test]
    fn empty_snapshot_is_not_an_error() {
        let result = PostureEvaluator::default().evaluate(&PoseSnapshot::new());
        assert!(result.is_correct);
        assert!(result.violations.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert!(result.evaluated_rules.is_empty());
        assert_eq!(result.skipped_rules.len(), 4);
    }

    #[test]
    fn unknown_pose_is_rejected_up_front() {
        let err = PostureEvaluator::for_pose(&PoseCatalog::builtin(), "tree").unwrap_err();
        assert!(matches!(err, Error::UnknownPose(ref id) if id == "tree"));
    }

    #[test]
    fn confidence_is_mean_of_used_keypoints() {
        let snapshot = PoseSnapshot::from_keypoints([
            Keypoint::new(BodyPart::LeftShoulder, 0.4, 0.40, 0.9),
            Keypoint::new(BodyPart::RightShoulder, 0.6, 0.42, 0.5),
            // not read by any rule that can be evaluated
            Keypoint::new(BodyPart::Nose, 0.5, 0.1, 0.1),
            Keypoint::new(BodyPart::LeftHip, 0.4, 0.6, 0.2),
        ]);
        let result = PostureEvaluator::default().evaluate(&snapshot);
        assert_eq!(result.evaluated_rules, ["shoulder_level"]);
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn min_visibility_is_configurable() {
        let snapshot = PoseSnapshot::from_keypoints([
            Keypoint::new(BodyPart::LeftShoulder, 0.4, 0.40, 0.2),
            Keypoint::new(BodyPart::RightShoulder, 0.6, 0.60, 0.2),
        ]);
        let strict = PostureEvaluator::default().evaluate(&snapshot);
        assert!(strict.is_correct);
        assert_eq!(strict.skipped_rules.len(), 4);

        let lenient = PostureEvaluator::default()
            .with_min_visibility(0.1)
            .evaluate(&snapshot);
        assert!(!lenient.is_correct);
        assert_eq!(lenient.violations[0].rule_id, "shoulder_level");
    }
}
