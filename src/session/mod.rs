//! Session orchestration: acquisition, schedules, teardown.

pub mod capture_session;
pub mod controller;
pub mod environment;
mod shared;

use std::sync::Arc;

use crate::audio::analyser::AudioAnalysis;
use crate::audio::sample::AudioSampleCallback;
use crate::error::ProctorError;
use crate::kernel::event::{CountersCallback, FaceCallback, SnapshotCallback, VoiceCallback};
use crate::kernel::time::{Clock, TokioClock};
use crate::media::{MediaCapture, VideoSurface};
use crate::services::{MediaUploader, MonitoringRecordSink};
use crate::vision::FaceDetector;

pub use capture_session::CaptureSession;
pub use controller::MonitoringSessionController;
pub use environment::{
    EnvironmentBus, EnvironmentEvent, EnvironmentEvents, PageViolation, TransitionTracker,
};
pub use shared::Violation;

/// Consumer hooks for one controller. All optional.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub on_snapshot: Option<SnapshotCallback>,
    pub on_audio_sample: Option<AudioSampleCallback>,
    pub on_voice: Option<VoiceCallback>,
    pub on_face: Option<FaceCallback>,
    pub on_counters: Option<CountersCallback>,
}

/// The outside world, injected.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn MediaCapture>,
    pub analysis: Arc<dyn AudioAnalysis>,
    pub environment: Arc<dyn EnvironmentEvents>,
    pub uploader: Option<Arc<dyn MediaUploader>>,
    pub records: Option<Arc<dyn MonitoringRecordSink>>,
    pub face_detector: Option<Arc<dyn FaceDetector>>,
    /// Pre-existing preview surface. A fresh one is used when absent.
    pub video: Option<Arc<VideoSurface>>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        capture: Arc<dyn MediaCapture>,
        analysis: Arc<dyn AudioAnalysis>,
        environment: Arc<dyn EnvironmentEvents>,
    ) -> Self {
        Self {
            capture,
            analysis,
            environment,
            uploader: None,
            records: None,
            face_detector: None,
            video: None,
            clock: Arc::new(TokioClock::new()),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn MediaUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_records(mut self, records: Arc<dyn MonitoringRecordSink>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    pub fn with_video(mut self, video: Arc<VideoSurface>) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// What the controller reports about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoringStatus {
    pub is_monitoring: bool,
    pub camera_active: bool,
    pub microphone_active: bool,
    /// Required modalities that could not be acquired, or the config error
    /// that prevented a start.
    pub errors: Vec<ProctorError>,
}

impl MonitoringStatus {
    pub fn error(&self) -> Option<&ProctorError> {
        self.errors.first()
    }
}
