pub mod model_mediapipe;

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Anatomical landmarks in the order a MediaPipe pose model emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl BodyPart {
    pub const COUNT: usize = 33;

    pub const ALL: [BodyPart; BodyPart::COUNT] = [
        BodyPart::Nose,
        BodyPart::LeftEyeInner,
        BodyPart::LeftEye,
        BodyPart::LeftEyeOuter,
        BodyPart::RightEyeInner,
        BodyPart::RightEye,
        BodyPart::RightEyeOuter,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::MouthLeft,
        BodyPart::MouthRight,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftPinky,
        BodyPart::RightPinky,
        BodyPart::LeftIndex,
        BodyPart::RightIndex,
        BodyPart::LeftThumb,
        BodyPart::RightThumb,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
        BodyPart::LeftHeel,
        BodyPart::RightHeel,
        BodyPart::LeftFootIndex,
        BodyPart::RightFootIndex,
    ];

    /// Position of this landmark in the detector output.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<BodyPart> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEyeInner => "left_eye_inner",
            BodyPart::LeftEye => "left_eye",
            BodyPart::LeftEyeOuter => "left_eye_outer",
            BodyPart::RightEyeInner => "right_eye_inner",
            BodyPart::RightEye => "right_eye",
            BodyPart::RightEyeOuter => "right_eye_outer",
            BodyPart::LeftEar => "left_ear",
            BodyPart::RightEar => "right_ear",
            BodyPart::MouthLeft => "mouth_left",
            BodyPart::MouthRight => "mouth_right",
            BodyPart::LeftShoulder => "left_shoulder",
            BodyPart::RightShoulder => "right_shoulder",
            BodyPart::LeftElbow => "left_elbow",
            BodyPart::RightElbow => "right_elbow",
            BodyPart::LeftWrist => "left_wrist",
            BodyPart::RightWrist => "right_wrist",
            BodyPart::LeftPinky => "left_pinky",
            BodyPart::RightPinky => "right_pinky",
            BodyPart::LeftIndex => "left_index",
            BodyPart::RightIndex => "right_index",
            BodyPart::LeftThumb => "left_thumb",
            BodyPart::RightThumb => "right_thumb",
            BodyPart::LeftHip => "left_hip",
            BodyPart::RightHip => "right_hip",
            BodyPart::LeftKnee => "left_knee",
            BodyPart::RightKnee => "right_knee",
            BodyPart::LeftAnkle => "left_ankle",
            BodyPart::RightAnkle => "right_ankle",
            BodyPart::LeftHeel => "left_heel",
            BodyPart::RightHeel => "right_heel",
            BodyPart::LeftFootIndex => "left_foot_index",
            BodyPart::RightFootIndex => "right_foot_index",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BodyPart {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BodyPart::ALL
            .iter()
            .copied()
            .find(|part| part.name() == s)
            .ok_or_else(|| format!("unknown body part '{}'", s))
    }
}

/// One detected landmark.
///
/// `position` is normalized to the frame: x and y are in [0, 1] for points
/// inside the image, with y growing downwards. Sources without depth leave z at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub body_part: BodyPart,
    pub position: Point3<f32>,
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(body_part: BodyPart, x: f32, y: f32, visibility: f32) -> Self {
        Self {
            body_part,
            position: Point3::new(x, y, 0.0),
            visibility,
        }
    }

    pub fn with_depth(body_part: BodyPart, position: Point3<f32>, visibility: f32) -> Self {
        Self {
            body_part,
            position,
            visibility,
        }
    }

    /// A keypoint is usable only when its visibility is strictly above the
    /// threshold.
    pub fn is_visible(&self, min_visibility: f32) -> bool {
        self.visibility > min_visibility
    }
}

/// All keypoints of one frame, at most one per body part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Keypoint>", from = "Vec<Keypoint>")]
pub struct PoseSnapshot {
    keypoints: Vec<Option<Keypoint>>,
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self {
            keypoints: vec![None; BodyPart::COUNT],
        }
    }
}

impl PoseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from a list of keypoints. A later keypoint for the
    /// same body part replaces an earlier one.
    pub fn from_keypoints<I>(keypoints: I) -> Self
    where
        I: IntoIterator<Item = Keypoint>,
    {
        let mut snapshot = Self::default();
        for keypoint in keypoints {
            snapshot.insert(keypoint);
        }
        snapshot
    }

    pub fn insert(&mut self, keypoint: Keypoint) {
        self.keypoints[keypoint.body_part.index()] = Some(keypoint);
    }

    pub fn remove(&mut self, body_part: BodyPart) -> Option<Keypoint> {
        self.keypoints[body_part.index()].take()
    }

    pub fn get(&self, body_part: BodyPart) -> Option<&Keypoint> {
        self.keypoints[body_part.index()].as_ref()
    }

    /// Returns the keypoint only if it is reliable enough to reason about.
    pub fn get_visible(&self, body_part: BodyPart, min_visibility: f32) -> Option<&Keypoint> {
        self.get(body_part)
            .filter(|keypoint| keypoint.is_visible(min_visibility))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.iter().all(Option::is_none)
    }
}

impl From<Vec<Keypoint>> for PoseSnapshot {
    fn from(keypoints: Vec<Keypoint>) -> Self {
        Self::from_keypoints(keypoints)
    }
}

impl From<PoseSnapshot> for Vec<Keypoint> {
    fn from(snapshot: PoseSnapshot) -> Self {
        snapshot.keypoints.into_iter().flatten().collect()
    }
}

/// A source of pose landmarks for a single frame.
///
/// Returning `Ok(None)` means the model ran but found nobody in the frame.
pub trait PoseLandmarksModel: Send + Sync {
    fn run(&self, image: &DynamicImage) -> Result<Option<PoseSnapshot>>;
}

impl<M: PoseLandmarksModel + ?Sized> PoseLandmarksModel for Box<M> {
    fn run(&self, image: &DynamicImage) -> Result<Option<PoseSnapshot>> {
        (**self).run(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_part_indices_follow_detector_order() {
        assert_eq!(BodyPart::LeftShoulder.index(), 11);
        assert_eq!(BodyPart::RightShoulder.index(), 12);
        assert_eq!(BodyPart::LeftHip.index(), 23);
        assert_eq!(BodyPart::RightAnkle.index(), 28);
        assert_eq!(BodyPart::from_index(32), Some(BodyPart::RightFootIndex));
        assert_eq!(BodyPart::from_index(33), None);
        for (i, part) in BodyPart::ALL.iter().enumerate() {
            assert_eq!(part.index(), i);
        }
    }

    #[test]
    fn body_part_names_parse_back() {
        for part in BodyPart::ALL {
            assert_eq!(part.name().parse::<BodyPart>(), Ok(part));
        }
        assert!("left_tail".parse::<BodyPart>().is_err());
    }

    #[test]
    fn later_keypoint_replaces_earlier() {
        let snapshot = PoseSnapshot::from_keypoints([
            Keypoint::new(BodyPart::Nose, 0.1, 0.1, 0.9),
            Keypoint::new(BodyPart::Nose, 0.2, 0.3, 0.8),
        ]);
        assert_eq!(snapshot.len(), 1);
        let nose = snapshot.get(BodyPart::Nose).unwrap();
        assert_eq!(nose.position.x, 0.2);
        assert_eq!(nose.visibility, 0.8);
    }

    #[test]
    fn get_visible_filters_low_confidence() {
        let snapshot = PoseSnapshot::from_keypoints([Keypoint::new(BodyPart::LeftHip, 0.5, 0.5, 0.2)]);
        assert!(snapshot.get(BodyPart::LeftHip).is_some());
        assert!(snapshot.get_visible(BodyPart::LeftHip, 0.3).is_none());
        assert!(snapshot.get_visible(BodyPart::LeftHip, 0.1).is_some());
    }

    #[test]
    fn visibility_at_threshold_is_not_enough() {
        let keypoint = Keypoint::new(BodyPart::LeftHip, 0.5, 0.5, 0.3);
        assert!(!keypoint.is_visible(0.3));
        assert!(keypoint.is_visible(0.29));
    }

    #[test]
    fn empty_snapshot() {
        let mut snapshot = PoseSnapshot::new();
        assert!(snapshot.is_empty());
        snapshot.insert(Keypoint::new(BodyPart::Nose, 0.5, 0.5, 1.0));
        assert!(!snapshot.is_empty());
        snapshot.remove(BodyPart::Nose);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn snapshot_serializes_present_keypoints_only() {
        let snapshot = PoseSnapshot::from_keypoints([
            Keypoint::new(BodyPart::LeftKnee, 0.4, 0.6, 0.9),
            Keypoint::new(BodyPart::Nose, 0.5, 0.1, 0.95),
        ]);
        let json = serde_json::to_value(&snapshot).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["body_part"], "nose");
        assert_eq!(items[1]["body_part"], "left_knee");

        let back: PoseSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
