//! Alignment rules described as data, grouped per target pose.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{angle_between, vertical_delta};
use crate::pose_landmarks::{BodyPart, PoseSnapshot};

pub const EXTENDED_SIDE_ANGLE: &str = "extended_side_angle";

/// The geometric predicate behind a rule. A check "fires" when the pose
/// violates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Fires if the two points differ vertically by more than `max_delta`.
    Level {
        left: BodyPart,
        right: BodyPart,
        max_delta: f32,
    },
    /// Fires if the angle at `vertex` is more than `tolerance` degrees away
    /// from `target`.
    AngleNear {
        first: BodyPart,
        vertex: BodyPart,
        last: BodyPart,
        target: f32,
        tolerance: f32,
    },
    /// Fires if the angle at `vertex` is below `min` degrees.
    AngleAtLeast {
        first: BodyPart,
        vertex: BodyPart,
        last: BodyPart,
        min: f32,
    },
}

impl RuleCheck {
    pub fn required_parts(&self) -> Vec<BodyPart> {
        match *self {
            RuleCheck::Level { left, right, .. } => vec![left, right],
            RuleCheck::AngleNear {
                first,
                vertex,
                last,
                ..
            }
            | RuleCheck::AngleAtLeast {
                first,
                vertex,
                last,
                ..
            } => vec![first, vertex, last],
        }
    }

    /// `Some(true)` if the check fires, `Some(false)` if it passes, `None` if
    /// it cannot be decided from this snapshot.
    pub fn fires(&self, snapshot: &PoseSnapshot, min_visibility: f32) -> Option<bool> {
        let point = |part: BodyPart| {
            snapshot
                .get_visible(part, min_visibility)
                .map(|keypoint| keypoint.position)
        };

        match *self {
            RuleCheck::Level {
                left,
                right,
                max_delta,
            } => Some(vertical_delta(&point(left)?, &point(right)?) > max_delta),
            RuleCheck::AngleNear {
                first,
                vertex,
                last,
                target,
                tolerance,
            } => {
                let angle = angle_between(&point(first)?, &point(vertex)?, &point(last)?)?;
                Some((angle - target).abs() > tolerance)
            }
            RuleCheck::AngleAtLeast {
                first,
                vertex,
                last,
                min,
            } => {
                let angle = angle_between(&point(first)?, &point(vertex)?, &point(last)?)?;
                Some(angle < min)
            }
        }
    }
}

/// A named check with the feedback shown when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRule {
    pub id: String,
    pub message: String,
    pub check: RuleCheck,
}

impl AlignmentRule {
    pub fn new(id: impl Into<String>, message: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            check,
        }
    }

    pub fn required_parts(&self) -> Vec<BodyPart> {
        self.check.required_parts()
    }
}

/// Ordered rules for one target pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<AlignmentRule>,
}

impl RuleSet {
    /// Extended side angle with the left leg in front.
    pub fn extended_side_angle() -> Self {
        Self {
            name: "Extended Side Angle".to_string(),
            rules: vec![
                AlignmentRule::new(
                    "shoulder_level",
                    "Shoulders are not level — try to keep them even.",
                    RuleCheck::Level {
                        left: BodyPart::LeftShoulder,
                        right: BodyPart::RightShoulder,
                        max_delta: 0.1,
                    },
                ),
                AlignmentRule::new(
                    "hip_level",
                    "Hips are not level — try to balance your weight evenly.",
                    RuleCheck::Level {
                        left: BodyPart::LeftHip,
                        right: BodyPart::RightHip,
                        max_delta: 0.1,
                    },
                ),
                AlignmentRule::new(
                    "front_knee_angle",
                    "Front knee should be at 90 degrees.",
                    RuleCheck::AngleNear {
                        first: BodyPart::LeftHip,
                        vertex: BodyPart::LeftKnee,
                        last: BodyPart::LeftAnkle,
                        target: 90.0,
                        tolerance: 15.0,
                    },
                ),
                AlignmentRule::new(
                    "back_leg_straight",
                    "Back leg should be straighter.",
                    RuleCheck::AngleAtLeast {
                        first: BodyPart::RightHip,
                        vertex: BodyPart::RightKnee,
                        last: BodyPart::RightAnkle,
                        min: 160.0,
                    },
                ),
            ],
        }
    }
}

/// Rule sets keyed by pose identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseCatalog {
    poses: BTreeMap<String, RuleSet>,
}

impl PoseCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The poses that ship with the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(EXTENDED_SIDE_ANGLE, RuleSet::extended_side_angle());
        catalog
    }

    /// Adds or replaces the rule set for `pose_id`.
    pub fn insert(&mut self, pose_id: impl Into<String>, rules: RuleSet) -> Option<RuleSet> {
        self.poses.insert(pose_id.into(), rules)
    }

    pub fn get(&self, pose_id: &str) -> Option<&RuleSet> {
        self.poses.get(pose_id)
    }

    pub fn pose_ids(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleSet)> {
        self.poses.iter().map(|(id, rules)| (id.as_str(), rules))
    }

    /// Merges `other` into this catalog; poses in `other` win on id clash.
    pub fn extend(&mut self, other: impl IntoIterator<Item = (String, RuleSet)>) {
        self.poses.extend(other);
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
