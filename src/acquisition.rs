//! Time-bounded landmark acquisition on a dedicated worker thread.
//!
//! The detector lives on the worker and is created lazily through a
//! [`DetectorHandle`]. At most one frame is in flight: a frame submitted while
//! the previous one is still being processed is dropped and reported as
//! [`Acquisition::Busy`], so stale frames never queue up behind a slow model.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::evaluator::{EvaluationResult, PostureEvaluator};
use crate::pose_landmarks::{PoseLandmarksModel, PoseSnapshot};

/// Reference time a caller should wait for one frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

type Factory<M> = Box<dyn Fn() -> Result<M> + Send>;

/// Owned, lazily initialized detector.
pub struct DetectorHandle<M> {
    factory: Factory<M>,
    model: Option<M>,
}

impl<M> DetectorHandle<M> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<M> + Send + 'static,
    {
        Self {
            factory: Box::new(factory),
            model: None,
        }
    }

    /// Wraps an already constructed detector.
    pub fn ready(model: M) -> Self
    where
        M: Send + 'static,
    {
        Self {
            factory: Box::new(|| Err(Error::Detection("detector cannot be rebuilt".to_string()))),
            model: Some(model),
        }
    }

    /// Builds the detector if it is not built yet. A failed build leaves the
    /// handle uninitialized, so the next call tries again.
    pub fn init(&mut self) -> Result<()> {
        if self.model.is_none() {
            let model = (self.factory)()?;
            info!("pose detector initialized");
            self.model = Some(model);
        }
        Ok(())
    }

    pub fn get(&mut self) -> Result<&M> {
        self.init()?;
        self.model
            .as_ref()
            .ok_or_else(|| Error::Detection("detector unavailable".to_string()))
    }

    pub fn teardown(&mut self) {
        if self.model.take().is_some() {
            info!("pose detector torn down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Landmarks(PoseSnapshot),
    NoLandmarks,
    TimedOut,
    Busy,
}

enum Command {
    Init(Sender<Result<()>>),
    Detect {
        frame: DynamicImage,
        reply: Sender<Result<Option<PoseSnapshot>>>,
    },
    Shutdown,
}

/// Marks the single frame the worker may be processing.
#[derive(Default)]
struct InFlight {
    busy: Mutex<bool>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot; `false` if a frame is already in flight.
    fn claim(&self) -> bool {
        let mut busy = self.lock();
        if *busy {
            return false;
        }
        *busy = true;
        true
    }

    fn release(&self) {
        *self.lock() = false;
        self.idle.notify_all();
    }

    fn is_busy(&self) -> bool {
        *self.lock()
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let busy = self.lock();
        let (busy, _) = self
            .idle
            .wait_timeout_while(busy, timeout, |busy| *busy)
            .unwrap_or_else(PoisonError::into_inner);
        !*busy
    }
}

pub struct FrameAcquisition {
    commands: Sender<Command>,
    in_flight: Arc<InFlight>,
    worker: Option<JoinHandle<()>>,
}

impl FrameAcquisition {
    pub fn spawn<M>(detector: DetectorHandle<M>) -> Result<Self>
    where
        M: PoseLandmarksModel + 'static,
    {
        let (commands, receiver) = mpsc::channel();
        let in_flight = Arc::new(InFlight::default());
        let worker_in_flight = in_flight.clone();

        let worker = std::thread::Builder::new()
            .name("pose-acquisition".to_string())
            .spawn(move || run_worker(detector, receiver, worker_in_flight))?;

        Ok(Self {
            commands,
            in_flight,
            worker: Some(worker),
        })
    }

    /// Initializes the detector on the worker ahead of the first frame.
    pub fn init(&self) -> Result<()> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(Command::Init(reply))
            .map_err(|_| Error::WorkerStopped)?;
        response.recv().map_err(|_| Error::WorkerStopped)?
    }

    /// Submits `frame` and waits at most `timeout` for its landmarks.
    pub fn acquire(&self, frame: DynamicImage, timeout: Duration) -> Result<Acquisition> {
        if !self.is_running() {
            return Err(Error::WorkerStopped);
        }
        if !self.in_flight.claim() {
            debug!("previous frame still in flight, dropping frame");
            return Ok(Acquisition::Busy);
        }

        let (reply, response) = mpsc::channel();
        if self.commands.send(Command::Detect { frame, reply }).is_err() {
            self.in_flight.release();
            return Err(Error::WorkerStopped);
        }

        match response.recv_timeout(timeout) {
            Ok(Ok(Some(snapshot))) if !snapshot.is_empty() => Ok(Acquisition::Landmarks(snapshot)),
            Ok(Ok(_)) => Ok(Acquisition::NoLandmarks),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "frame processing timed out");
                Ok(Acquisition::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => {
                // the worker died with the frame; nothing will clear the slot
                warn!("acquisition worker stopped while processing a frame");
                self.in_flight.release();
                Err(Error::WorkerStopped)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    /// Blocks until no frame is in flight or `timeout` passes. Returns `true`
    /// if the worker is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.in_flight.wait_idle(timeout)
    }

    /// Stops the worker and tears the detector down. Waits for a frame that
    /// is still being processed.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown);
            if worker.join().is_err() {
                warn!("acquisition worker panicked");
            }
        }
    }
}

impl Drop for FrameAcquisition {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<M: PoseLandmarksModel>(
    mut detector: DetectorHandle<M>,
    commands: Receiver<Command>,
    in_flight: Arc<InFlight>,
) {
    while let Ok(command) = commands.recv() {
        match command {
            Command::Init(reply) => {
                let _ = reply.send(detector.init());
            }
            Command::Detect { frame, reply } => {
                let result = detector.get().and_then(|model| model.run(&frame));
                if let Err(e) = &result {
                    warn!(error = %e, "landmark detection failed");
                }
                // cleared before replying so the caller can submit right away
                in_flight.release();
                if reply.send(result).is_err() {
                    debug!("discarding late landmark result");
                }
            }
            Command::Shutdown => break,
        }
    }
    detector.teardown();
}

/// Landmarks of one frame together with their verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub snapshot: PoseSnapshot,
    pub result: EvaluationResult,
}

/// What became of one frame handed to [`analyze_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Analyzed(FrameAnalysis),
    /// The detector ran and found nobody.
    NoLandmarks,
    /// No answer within the timeout.
    TimedOut,
    /// An earlier frame was still in flight, so this one was never processed.
    Dropped,
}

/// Detects and evaluates one frame in-process.
pub fn analyze_frame(
    acquisition: &FrameAcquisition,
    evaluator: &PostureEvaluator,
    frame: DynamicImage,
    timeout: Duration,
) -> Result<FrameOutcome> {
    let outcome = match acquisition.acquire(frame, timeout)? {
        Acquisition::Landmarks(snapshot) => {
            let result = evaluator.evaluate(&snapshot);
            FrameOutcome::Analyzed(FrameAnalysis { snapshot, result })
        }
        Acquisition::NoLandmarks => {
            debug!("no pose landmarks detected");
            FrameOutcome::NoLandmarks
        }
        Acquisition::TimedOut => FrameOutcome::TimedOut,
        Acquisition::Busy => FrameOutcome::Dropped,
    };
    Ok(outcome)
}
