use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use nalgebra::Point3;
use ndarray::{Array, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, ExecutionProvider, Session, SessionBuilder, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::pose_landmarks::{BodyPart, Keypoint, PoseLandmarksModel, PoseSnapshot};

/// Side length of the square model input, in pixels.
pub const INPUT_SIZE: u32 = 256;

// x, y, z, visibility logit, presence logit
const VALUES_PER_LANDMARK: usize = 5;

/// Square region of the frame fed to the model: (x, y, side) in pixels.
pub type CropBox = (u32, u32, u32);

/// MediaPipe BlazePose landmark model run through onnxruntime.
///
/// Expects the full-body landmark network exported to ONNX, taking a
/// `1x256x256x3` float image in [0, 1] and returning the landmark tensor
/// first and the pose presence score second.
pub struct MediapipePoseLandmarksModel {
    _environment: Arc<Environment>,
    session: Session,
    min_detection_confidence: f32,
}

impl MediapipePoseLandmarksModel {
    pub fn from_file(
        model_path: impl AsRef<Path>,
        intra_threads: i16,
        min_detection_confidence: f32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let environment = Environment::builder()
            .with_name("posetracking")
            .with_execution_providers([ExecutionProvider::CPU(Default::default())])
            .build()?
            .into_arc();

        let session = SessionBuilder::new(&environment)?
            .with_intra_threads(intra_threads)?
            .with_model_from_file(model_path)?;

        info!(model = %model_path.display(), "loaded pose landmark model");

        Ok(Self {
            _environment: environment,
            session,
            min_detection_confidence,
        })
    }
}

impl PoseLandmarksModel for MediapipePoseLandmarksModel {
    fn run(&self, image: &DynamicImage) -> Result<Option<PoseSnapshot>> {
        let crop = square_crop(image.width(), image.height())?;
        let input = preprocess(image, crop);

        let array: CowArray<_, _> =
            Array::from_shape_vec((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3), input)?
                .into_dyn()
                .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        if outputs.len() < 2 {
            return Err(Error::Detection(format!(
                "expected at least 2 model outputs, got {}",
                outputs.len()
            )));
        }

        let pose_flag: OrtOwnedTensor<f32, _> = outputs[1].try_extract()?;
        let pose_flag = pose_flag.view().iter().copied().next().unwrap_or(0.0);
        if !pose_present(pose_flag, self.min_detection_confidence) {
            debug!(pose_flag, "no pose in frame");
            return Ok(None);
        }

        let raw: OrtOwnedTensor<f32, _> = outputs[0].try_extract()?;
        let raw: Vec<f32> = raw.view().iter().copied().collect();

        decode_landmarks(&raw, crop, image.width(), image.height()).map(Some)
    }
}

/// The presence output already ends in a sigmoid, so the flag is compared as
/// a probability.
pub fn pose_present(pose_flag: f32, min_detection_confidence: f32) -> bool {
    pose_flag >= min_detection_confidence
}

/// Largest centered square inside the frame.
pub fn square_crop(width: u32, height: u32) -> Result<CropBox> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidFrame(format!(
            "frame has no pixels ({}x{})",
            width, height
        )));
    }
    let side = width.min(height);
    Ok(((width - side) / 2, (height - side) / 2, side))
}

/// Crops, resizes and flattens the frame into NHWC floats in [0, 1].
pub fn preprocess(image: &DynamicImage, crop: CropBox) -> Vec<f32> {
    let (x, y, side) = crop;
    let input = image
        .crop_imm(x, y, side, side)
        .resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();

    input
        .pixels()
        .flat_map(|p| p.0)
        .map(|p| p as f32 / 255.0)
        .collect()
}

/// Maps the raw landmark tensor back to coordinates normalized to the full frame.
pub fn decode_landmarks(
    raw: &[f32],
    crop: CropBox,
    image_width: u32,
    image_height: u32,
) -> Result<PoseSnapshot> {
    let expected = BodyPart::COUNT * VALUES_PER_LANDMARK;
    if raw.len() < expected {
        return Err(Error::Detection(format!(
            "landmark tensor too short: expected at least {} values, got {}",
            expected,
            raw.len()
        )));
    }

    let (crop_x, crop_y, side) = crop;
    let scale = side as f32 / INPUT_SIZE as f32;

    // the model appends auxiliary landmarks after the 33 body landmarks
    let keypoints = raw
        .chunks_exact(VALUES_PER_LANDMARK)
        .zip(BodyPart::ALL)
        .map(|(row, body_part)| {
            let x = (row[0] * scale + crop_x as f32) / image_width as f32;
            let y = (row[1] * scale + crop_y as f32) / image_height as f32;
            // depth uses the same scale as x
            let z = row[2] * scale / image_width as f32;
            Keypoint::with_depth(body_part, Point3::new(x, y, z), sigmoid(row[3]))
        });

    Ok(PoseSnapshot::from_keypoints(keypoints))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
