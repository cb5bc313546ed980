use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use rayon::prelude::*;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use posetracking::acquisition::{
    analyze_frame, DetectorHandle, FrameAcquisition, FrameAnalysis, FrameOutcome,
};
use posetracking::config::Config;
use posetracking::evaluator::PostureEvaluator;
use posetracking::frame::load_image;
use posetracking::overlay::draw_pose;
use posetracking::pose_landmarks::model_mediapipe::MediapipePoseLandmarksModel;
use posetracking::utils::{FeedbackNotifier, TimeSeries};

#[derive(Parser)]
#[command(name = "posetracking", version, about = "Pose alignment feedback from images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect landmarks in images and check them against a pose.
    Analyze {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Pose to check against (defaults to the configured pose).
        #[arg(long)]
        pose: Option<String>,
        #[arg(long, env = "POSETRACKING_CONFIG")]
        config: Option<PathBuf>,
        /// Overrides the model path from the configuration.
        #[arg(long)]
        model: Option<PathBuf>,
        /// Write an annotated copy of each image into this directory.
        #[arg(long)]
        overlay_dir: Option<PathBuf>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// List known poses and their rules.
    Poses {
        #[arg(long, env = "POSETRACKING_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Write the default configuration.
    InitConfig { path: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("POSETRACKING_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Analyze {
            images,
            pose,
            config,
            model,
            overlay_dir,
            timeout_ms,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(model) = model {
                config.model_path = model;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.detection_timeout_ms = timeout_ms;
            }
            analyze(&config, pose.as_deref(), &images, overlay_dir.as_deref())
        }
        Command::Poses { config } => {
            let config = load_config(config.as_deref())?;
            for (id, rules) in config.catalog().iter() {
                println!("{} ({})", id, rules.name);
                for rule in &rules.rules {
                    println!("  {}: {}", rule.id, rule.message);
                }
            }
            Ok(())
        }
        Command::InitConfig { path } => {
            Config::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote default configuration");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn analyze(
    config: &Config,
    pose: Option<&str>,
    images: &[PathBuf],
    overlay_dir: Option<&Path>,
) -> Result<()> {
    let evaluator = config.evaluator(pose)?;
    let timeout = config.detection_timeout();

    if let Some(dir) = overlay_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let model_path = config.model_path.clone();
    let intra_threads = config.intra_threads;
    let min_detection_confidence = config.min_detection_confidence;
    let detector = DetectorHandle::new(move || {
        MediapipePoseLandmarksModel::from_file(&model_path, intra_threads, min_detection_confidence)
    });
    let acquisition = FrameAcquisition::spawn(detector)?;
    acquisition.init().context("initializing pose detector")?;

    // decoding dominates for large photos, detection runs one frame at a time
    let frames: Vec<_> = images
        .par_iter()
        .map(|path| (path, load_image(path)))
        .collect();

    let mut notifier = FeedbackNotifier::new();
    let mut confidence = TimeSeries::new(30);

    for (path, frame) in frames {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(image = %path.display(), error = %e, "could not decode image");
                println!(
                    "{}",
                    json!({ "image": path, "status": "error", "error": e.to_string() })
                );
                continue;
            }
        };

        let overlay_source = overlay_dir.map(|_| frame.clone());
        let (report, analysis) = process_frame(&acquisition, &evaluator, path, frame, timeout);
        println!("{}", report);
        let Some(analysis) = analysis else {
            continue;
        };

        confidence.push(analysis.result.confidence, now_millis());
        if let Some(notice) = notifier.notify(&analysis.result) {
            info!(image = %path.display(), notice = %notice.message, "feedback");
        }

        if let (Some(dir), Some(source)) = (overlay_dir, overlay_source) {
            let canvas = draw_pose(
                &source,
                &analysis.snapshot,
                analysis.result.is_correct,
                evaluator.min_visibility(),
            );
            let name = path.file_stem().unwrap_or_default().to_string_lossy();
            let target = dir.join(format!("{}_pose.png", name));
            canvas
                .save(&target)
                .with_context(|| format!("writing {}", target.display()))?;
        }
    }

    if let Some(mean) = confidence.get_mean() {
        info!(frames = confidence.len(), mean_confidence = mean, "analysis finished");
    }

    Ok(())
}

/// Runs one decoded frame through the detector and returns its report line.
/// Failures are reported per frame so the rest of the batch still runs.
fn process_frame(
    acquisition: &FrameAcquisition,
    evaluator: &PostureEvaluator,
    path: &Path,
    frame: DynamicImage,
    timeout: Duration,
) -> (Value, Option<FrameAnalysis>) {
    // a frame that timed out may still hold the worker
    if !acquisition.wait_idle(timeout) {
        warn!(image = %path.display(), "detector still busy with an earlier frame");
    }

    match analyze_frame(acquisition, evaluator, frame, timeout) {
        Ok(FrameOutcome::Analyzed(analysis)) => {
            let report = json!({
                "image": path,
                "status": "analyzed",
                "result": analysis.result,
                "landmarks": analysis.snapshot,
            });
            (report, Some(analysis))
        }
        Ok(FrameOutcome::NoLandmarks) => (
            json!({ "image": path, "status": "no_landmarks", "landmarks": null }),
            None,
        ),
        Ok(FrameOutcome::TimedOut) => (json!({ "image": path, "status": "timed_out" }), None),
        Ok(FrameOutcome::Dropped) => (json!({ "image": path, "status": "dropped" }), None),
        Err(e) => {
            warn!(image = %path.display(), error = %e, "could not analyze image");
            (
                json!({ "image": path, "status": "error", "error": e.to_string() }),
                None,
            )
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use posetracking::pose_landmarks::{BodyPart, Keypoint, PoseLandmarksModel, PoseSnapshot};
    use posetracking::Error;

    struct SlowModel(Duration);

    impl PoseLandmarksModel for SlowModel {
        fn run(&self, _image: &DynamicImage) -> posetracking::Result<Option<PoseSnapshot>> {
            std::thread::sleep(self.0);
            Ok(Some(PoseSnapshot::from_keypoints([
                Keypoint::new(BodyPart::LeftShoulder, 0.4, 0.40, 0.9),
                Keypoint::new(BodyPart::RightShoulder, 0.6, 0.41, 0.9),
            ])))
        }
    }

    struct FailingModel;

    impl PoseLandmarksModel for FailingModel {
        fn run(&self, _image: &DynamicImage) -> posetracking::Result<Option<PoseSnapshot>> {
            Err(Error::Detection("bad tensor shape".to_string()))
        }
    }

    fn frame() -> DynamicImage {
        DynamicImage::new_rgb8(8, 8)
    }

    #[test]
    fn detector_error_is_reported_per_frame() {
        let acquisition = FrameAcquisition::spawn(DetectorHandle::ready(FailingModel)).unwrap();
        let evaluator = PostureEvaluator::default();
        let timeout = Duration::from_millis(1000);

        for name in ["a.png", "b.png"] {
            let (report, analysis) =
                process_frame(&acquisition, &evaluator, Path::new(name), frame(), timeout);
            assert!(analysis.is_none());
            assert_eq!(report["image"], name);
            assert_eq!(report["status"], "error");
            assert!(report["error"].as_str().unwrap().contains("bad tensor shape"));
        }
    }

    #[test]
    fn frame_after_timeout_waits_for_the_detector() {
        let acquisition =
            FrameAcquisition::spawn(DetectorHandle::ready(SlowModel(Duration::from_millis(150))))
                .unwrap();
        let evaluator = PostureEvaluator::default();

        let (report, analysis) = process_frame(
            &acquisition,
            &evaluator,
            Path::new("first.png"),
            frame(),
            Duration::from_millis(50),
        );
        assert_eq!(report["status"], "timed_out");
        assert!(analysis.is_none());

        let (report, analysis) = process_frame(
            &acquisition,
            &evaluator,
            Path::new("second.png"),
            frame(),
            Duration::from_millis(1000),
        );
        assert_eq!(report["status"], "analyzed");
        assert!(analysis.unwrap().result.is_correct);
    }
}
