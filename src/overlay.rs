//! Draws detected landmarks over a frame.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::pose_landmarks::{BodyPart, PoseSnapshot};

const CORRECT_POINT: Rgb<u8> = Rgb([0x22, 0xC5, 0x5E]);
const CORRECT_LINE: Rgb<u8> = Rgb([0x4A, 0xDE, 0x80]);
const VISIBLE_POINT: Rgb<u8> = Rgb([0x4C, 0x1D, 0x95]);
const HIDDEN_POINT: Rgb<u8> = Rgb([0x9C, 0xA3, 0xAF]);
const LINE: Rgb<u8> = Rgb([0x81, 0x8C, 0xF8]);

const POINT_RADIUS: i32 = 5;

pub const CONNECTIONS: [(BodyPart, BodyPart); 12] = [
    // torso
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    // arms
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    // legs
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

/// Returns a copy of `frame` with the skeleton drawn on it. Connections are
/// only drawn between keypoints above `min_visibility`.
pub fn draw_pose(
    frame: &DynamicImage,
    snapshot: &PoseSnapshot,
    is_correct: bool,
    min_visibility: f32,
) -> RgbImage {
    let mut canvas = frame.to_rgb8();
    let (width, height) = (canvas.width() as f32, canvas.height() as f32);
    let to_pixels = |x: f32, y: f32| (x * width, y * height);

    let line_color = if is_correct { CORRECT_LINE } else { LINE };
    for (from, to) in CONNECTIONS {
        let (Some(a), Some(b)) = (
            snapshot.get_visible(from, min_visibility),
            snapshot.get_visible(to, min_visibility),
        ) else {
            continue;
        };
        draw_line_segment_mut(
            &mut canvas,
            to_pixels(a.position.x, a.position.y),
            to_pixels(b.position.x, b.position.y),
            line_color,
        );
    }

    for keypoint in snapshot.iter() {
        let color = if is_correct {
            CORRECT_POINT
        } else if keypoint.is_visible(min_visibility) {
            VISIBLE_POINT
        } else {
            HIDDEN_POINT
        };
        let (x, y) = to_pixels(keypoint.position.x, keypoint.position.y);
        draw_filled_circle_mut(&mut canvas, (x as i32, y as i32), POINT_RADIUS, color);
    }

    canvas
}
