use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::FaceConfig;
use crate::error::{ProctorError, Result};
use crate::kernel::event::{DetectionState, FaceCallback, FaceUpdate};
use crate::kernel::gate::{run_callback, DeliveryGate};
use crate::kernel::sync::write;
use crate::media::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceDetection {
    pub faces: Vec<FaceBox>,
}

impl FaceDetection {
    pub fn face_count(&self) -> u32 {
        self.faces.len() as u32
    }
}

/// External face detector. Only the number of faces is consumed.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Prepares the model. Called each time the loop is enabled.
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    /// `Ok(None)` means the detector produced no result for this frame.
    async fn detect(&self, frame: &RgbImage) -> Result<Option<FaceDetection>>;

    /// Frees the model. Called once per enabled period.
    fn release(&self) {}
}

/// A detector result, or its absence, as a face count.
pub fn face_count(result: Option<&FaceDetection>) -> u32 {
    result.map(FaceDetection::face_count).unwrap_or(0)
}

struct RunningFaces {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    gate: Arc<DeliveryGate>,
}

/// Periodic face sampling over a frame source.
pub struct FaceDetectionLoop {
    config: FaceConfig,
    detector: Arc<dyn FaceDetector>,
    source: Arc<dyn FrameSource>,
    on_update: Option<FaceCallback>,
    state: Arc<RwLock<DetectionState>>,
    running: Option<RunningFaces>,
}

impl FaceDetectionLoop {
    pub fn new(
        config: &FaceConfig,
        detector: Arc<dyn FaceDetector>,
        source: Arc<dyn FrameSource>,
    ) -> Self {
        Self {
            config: config.clone(),
            detector,
            source,
            on_update: None,
            state: Arc::new(RwLock::new(DetectionState::default())),
            running: None,
        }
    }

    pub fn with_state(mut self, state: Arc<RwLock<DetectionState>>) -> Self {
        self.state = state;
        self
    }

    pub fn on_update(mut self, callback: FaceCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub async fn enable(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        if let Err(e) = self.detector.load().await {
            let err = ProctorError::DetectionFailure(format!("face detector failed to load: {}", e));
            warn!("{}", err);
            return Err(err);
        }

        let cancel = CancellationToken::new();
        let gate = Arc::new(DeliveryGate::new());
        let task = tokio::spawn(run_face_loop(
            self.config.clone(),
            self.detector.clone(),
            self.source.clone(),
            self.on_update.clone(),
            self.state.clone(),
            gate.clone(),
            cancel.clone(),
        ));

        info!("Face detection started (every {}ms)", self.config.interval_ms);
        self.running = Some(RunningFaces { cancel, task, gate });
        Ok(())
    }

    /// Cancels the interval and releases the detector. Idempotent.
    pub fn disable(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.gate.close();
        running.cancel.cancel();
        running.task.abort();
        self.detector.release();

        {
            let mut state = write(&self.state);
            state.apply_faces(&FaceUpdate::from_count(0));
        }
        info!("Face detection stopped");
    }
}

impl Drop for FaceDetectionLoop {
    fn drop(&mut self) {
        self.disable();
    }
}

async fn run_face_loop(
    config: FaceConfig,
    detector: Arc<dyn FaceDetector>,
    source: Arc<dyn FrameSource>,
    on_update: Option<FaceCallback>,
    state: Arc<RwLock<DetectionState>>,
    gate: Arc<DeliveryGate>,
    cancel: CancellationToken,
) {
    let mut cadence = tokio::time::interval(Duration::from_millis(config.interval_ms));
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timeout = Duration::from_millis(config.detection_timeout_ms);

    // Reused across ticks; the source reallocates only on a size change.
    let mut frame = RgbImage::new(0, 0);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {}
        }

        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            trace!("No video frame yet, skipping face tick");
            continue;
        }
        if !source.read_frame(&mut frame) {
            trace!("Frame source returned nothing, skipping face tick");
            continue;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = tokio::time::timeout(timeout, detector.detect(&frame)) => r,
        };

        let count = match result {
            Ok(Ok(detection)) => face_count(detection.as_ref()),
            Ok(Err(e)) => {
                let err = match e {
                    ProctorError::DetectionFailure(_) => e,
                    other => ProctorError::DetectionFailure(other.to_string()),
                };
                warn!("{}", err);
                continue;
            }
            Err(_) => {
                warn!("Face detection exceeded {}ms, skipping tick", timeout.as_millis());
                continue;
            }
        };

        let update = FaceUpdate::from_count(count);
        let delivered = gate.deliver(|| {
            write(&state).apply_faces(&update);
            debug!("Faces in frame: {}", update.face_count);
            if let Some(cb) = &on_update {
                run_callback("face", cb.as_ref(), update);
            }
        });
        if !delivered {
            break;
        }
    }
}
