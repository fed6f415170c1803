use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::capture_session::CaptureSession;
use super::environment::{EnvironmentEvent, TransitionTracker};
use super::shared::{SessionShared, SharedParts, Violation};
use super::{Collaborators, MonitoringStatus, SessionCallbacks};
use crate::audio::analyser::{AudioAnalysisContext, SharedAnalysisContext};
use crate::audio::AudioDetectionLoop;
use crate::config::{ProctorConfig, Requirement};
use crate::error::ProctorError;
use crate::kernel::event::{
    DetectionState, FaceUpdate, SnapshotCategory, SnapshotRecord, ViolationCounters, VoiceEvent,
};
use crate::kernel::sync::{lock, read, write};
use crate::kernel::telemetry::event::{IntegrityEvent, LifecycleEvent, TelemetryEntry};
use crate::kernel::telemetry::metrics::TelemetrySummary;
use crate::kernel::telemetry::recorder::TelemetryRecorder;
use crate::media::{FrameSource, MediaConstraints, MediaKind, MediaStream, VideoSurface};
use crate::services::MonitoringRecordRequest;
use crate::vision::FaceDetectionLoop;

/// Top-level orchestrator for one exam attempt.
///
/// At most one [`CaptureSession`] exists at a time. Counters and snapshot
/// records belong to the session and start from zero on every `start`; the
/// last session's values stay readable after `stop`.
pub struct MonitoringSessionController {
    config: ProctorConfig,
    deps: Collaborators,
    callbacks: SessionCallbacks,
    video: Arc<VideoSurface>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    status: MonitoringStatus,
    shared: Option<Arc<SessionShared>>,
    session: Option<CaptureSession>,
}

impl MonitoringSessionController {
    pub fn new(config: ProctorConfig, deps: Collaborators) -> Self {
        let video = deps.video.clone().unwrap_or_default();
        Self {
            config,
            deps,
            callbacks: SessionCallbacks::default(),
            video,
            telemetry: Arc::new(Mutex::new(TelemetryRecorder::new())),
            status: MonitoringStatus::default(),
            shared: None,
            session: None,
        }
    }

    /// Takes effect on the next `start`.
    pub fn with_callbacks(mut self, callbacks: SessionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.config
    }

    pub fn status(&self) -> MonitoringStatus {
        self.status.clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(CaptureSession::id)
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn video_surface(&self) -> Arc<VideoSurface> {
        self.video.clone()
    }

    pub fn counters(&self) -> ViolationCounters {
        self.shared
            .as_ref()
            .map(|s| s.counters())
            .unwrap_or_default()
    }

    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.shared
            .as_ref()
            .map(|s| s.snapshots())
            .unwrap_or_default()
    }

    pub fn snapshot_media_ids(&self) -> Vec<String> {
        self.snapshots().into_iter().map(|s| s.media_id).collect()
    }

    pub fn detection_state(&self) -> DetectionState {
        self.shared
            .as_ref()
            .map(|s| read(&s.detection).clone())
            .unwrap_or_default()
    }

    /// Raster (re)allocations made by the current session's snapshot path.
    pub fn snapshot_allocations(&self) -> u64 {
        self.shared
            .as_ref()
            .map(|s| s.snapshot_surface_allocations())
            .unwrap_or(0)
    }

    pub fn telemetry_summary(&self) -> TelemetrySummary {
        lock(&self.telemetry).summary()
    }

    pub fn telemetry_entries(&self) -> Vec<TelemetryEntry> {
        lock(&self.telemetry).entries().cloned().collect()
    }

    /// The payload the next record creation would carry.
    pub fn record_request(&self) -> Option<MonitoringRecordRequest> {
        self.shared.as_ref().map(|s| s.record_request())
    }

    /// Takes a snapshot now. Returns false when not monitoring or no frame is
    /// available.
    pub fn capture_snapshot(&self, category: Option<SnapshotCategory>) -> bool {
        match (&self.session, &self.shared) {
            (Some(_), Some(shared)) => shared.capture_snapshot(category),
            _ => false,
        }
    }

    /// Fire-and-forget record creation. False when not monitoring or there
    /// is no record collaborator.
    pub fn report_now(&self) -> bool {
        match (&self.session, &self.shared) {
            (Some(_), Some(shared)) => shared.spawn_report(),
            _ => false,
        }
    }

    pub async fn set_enabled(&mut self, enabled: bool) -> MonitoringStatus {
        if enabled {
            self.start().await
        } else {
            self.stop();
            self.status()
        }
    }

    fn record(&self, event: IntegrityEvent) {
        let now = self.deps.clock.now_ms();
        lock(&self.telemetry).record(now, event);
    }

    /// Acquires media and starts every configured schedule. Never panics.
    ///
    /// A failed required modality lands in `status().errors` and the session
    /// runs with what it has, as long as one required modality came up. When
    /// none did, or the config is invalid, nothing is started and the status
    /// reports the initialization error with `is_monitoring == false`.
    pub async fn start(&mut self) -> MonitoringStatus {
        if self.session.is_some() {
            return self.status();
        }

        if let Err(e) = self.config.validate() {
            error!("Refusing to start monitoring: {}", e);
            return self.fail_start(vec![e]);
        }

        let session_cfg = self.config.session.clone();

        // Transitions during the permission prompts belong to this session.
        let events = self.deps.environment.subscribe();

        let mut failures = Vec::new();
        let camera = self
            .acquire(MediaKind::Camera, session_cfg.camera, &mut failures)
            .await;
        let microphone = self
            .acquire(MediaKind::Microphone, session_cfg.microphone, &mut failures)
            .await;

        let required_up = (session_cfg.camera.is_required() && camera.is_some())
            || (session_cfg.microphone.is_required() && microphone.is_some());
        if !failures.is_empty() && !required_up {
            for stream in [camera, microphone].into_iter().flatten() {
                stream.stop_all();
            }
            self.video.detach();
            error!("No required capture device available, monitoring not started");
            return self.fail_start(failures);
        }

        let shared = Arc::new(SessionShared::new(SharedParts {
            enrollment_id: session_cfg.enrollment_id.clone(),
            jpeg_quality: self.config.snapshot.jpeg_quality,
            face_cooldown_ms: self.config.face.violation_cooldown_ms,
            telemetry: self.telemetry.clone(),
            clock: self.deps.clock.clone(),
            callbacks: self.callbacks.clone(),
            video: self.video.clone(),
            uploader: self.deps.uploader.clone(),
            records: self.deps.records.clone(),
            auto_upload: session_cfg.auto_upload,
            auto_report: session_cfg.auto_report,
        }));
        let mut session = CaptureSession::new(shared.id, shared.gate.clone(), self.video.clone());

        let context = microphone.as_ref().and_then(|mic| self.analysis_context(mic));
        if let Some(stream) = camera.clone() {
            session.set_camera(stream);
        }
        if let Some(stream) = microphone.clone() {
            session.set_microphone(stream);
        }
        if let Some(ctx) = context.clone() {
            session.set_audio_context(ctx);
        }

        session.push_listener(tokio::spawn(run_environment_listener(
            shared.clone(),
            events,
            session.cancel_token(),
        )));

        if camera.is_some() && shared.wants_snapshots() {
            session.push_timer(tokio::spawn(run_snapshot_schedule(
                shared.clone(),
                Duration::from_millis(self.config.snapshot.warmup_ms),
                Duration::from_millis(self.config.snapshot.interval_ms),
                session.cancel_token(),
            )));
        }

        if let Some(ctx) = &context {
            if session_cfg.audio_sampling && self.callbacks.on_audio_sample.is_some() {
                session.push_timer(tokio::spawn(run_audio_sampling(
                    shared.clone(),
                    ctx.clone(),
                    Duration::from_millis(self.config.audio_sampling.interval_ms),
                    session.cancel_token(),
                )));
            }
        }

        if let Some(period) = session_cfg.report_interval_ms {
            if self.deps.records.is_some() {
                session.push_timer(tokio::spawn(run_report_schedule(
                    shared.clone(),
                    Duration::from_millis(period),
                    session.cancel_token(),
                )));
            }
        }

        if let Some(ctx) = context.clone().filter(|_| session_cfg.voice_detection) {
            let voice_shared = shared.clone();
            let mut audio = AudioDetectionLoop::new(
                &self.config,
                self.deps.capture.clone(),
                self.deps.analysis.clone(),
            )
            .with_clock(self.deps.clock.clone())
            .with_state(shared.detection.clone())
            .on_voice(Arc::new(move |event: VoiceEvent| {
                voice_shared.handle_voice(event);
                Ok(())
            }));
            audio.start_with_context(ctx);
            session.set_audio_loop(audio);
        }

        if session_cfg.face_detection && camera.is_some() {
            if let Some(detector) = self.deps.face_detector.clone() {
                let face_shared = shared.clone();
                let source: Arc<dyn FrameSource> = self.video.clone();
                let mut face = FaceDetectionLoop::new(&self.config.face, detector, source)
                    .with_state(shared.detection.clone())
                    .on_update(Arc::new(move |update: FaceUpdate| {
                        face_shared.handle_face(update);
                        Ok(())
                    }));
                match face.enable().await {
                    Ok(()) => session.set_face_loop(face),
                    Err(e) => warn!("Continuing without face detection: {}", e),
                }
            }
        }

        self.status = MonitoringStatus {
            is_monitoring: true,
            camera_active: camera.is_some(),
            microphone_active: microphone.is_some(),
            errors: failures,
        };
        self.record(IntegrityEvent::Lifecycle(LifecycleEvent::SessionStarted));
        info!(
            "Monitoring session {} started (camera: {}, microphone: {})",
            session.id(),
            self.status.camera_active,
            self.status.microphone_active
        );

        self.shared = Some(shared);
        self.session = Some(session);
        self.status()
    }

    fn fail_start(&mut self, errors: Vec<ProctorError>) -> MonitoringStatus {
        self.record(IntegrityEvent::Lifecycle(LifecycleEvent::StartFailed));
        self.status = MonitoringStatus {
            errors,
            ..MonitoringStatus::default()
        };
        self.status()
    }

    async fn acquire(
        &self,
        kind: MediaKind,
        requirement: Requirement,
        failures: &mut Vec<ProctorError>,
    ) -> Option<Arc<dyn MediaStream>> {
        if !requirement.wanted() {
            return None;
        }

        if kind == MediaKind::Camera {
            if let Some(stream) = self.video.active_stream() {
                info!("Adopting camera stream {} already on the video surface", stream.id());
                return Some(stream);
            }
        }

        match self
            .deps
            .capture
            .request(kind, &MediaConstraints::for_kind(kind))
            .await
        {
            Ok(stream) => {
                if kind == MediaKind::Camera {
                    self.video.attach(stream.clone());
                }
                Some(stream)
            }
            Err(e) => {
                if requirement.is_required() {
                    error!("Required {} unavailable: {}", kind, e);
                    failures.push(e);
                } else {
                    info!("Optional {} unavailable, continuing without it: {}", kind, e);
                }
                self.record(IntegrityEvent::Lifecycle(match kind {
                    MediaKind::Camera => LifecycleEvent::CameraUnavailable,
                    MediaKind::Microphone => LifecycleEvent::MicrophoneUnavailable,
                }));
                None
            }
        }
    }

    fn analysis_context(&self, microphone: &Arc<dyn MediaStream>) -> Option<SharedAnalysisContext> {
        match self.deps.analysis.create(microphone, &self.config.analyser) {
            Ok(node) => Some(AudioAnalysisContext::shared(node)),
            Err(e) => {
                warn!("Microphone active but analysis unavailable: {}", e);
                None
            }
        }
    }

    /// Synchronous and idempotent. Once this returns no callback fires and
    /// every track is stopped.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
            self.record(IntegrityEvent::Lifecycle(LifecycleEvent::SessionStopped));
            info!("Monitoring session {} stopped", session.id());
        }
        if let Some(shared) = &self.shared {
            *write(&shared.detection) = DetectionState::default();
        }
        self.status = MonitoringStatus::default();
    }
}

impl Drop for MonitoringSessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_environment_listener(
    shared: Arc<SessionShared>,
    mut events: Receiver<EnvironmentEvent>,
    cancel: CancellationToken,
) {
    let mut tracker = TransitionTracker::new();
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = events.recv() => r,
        };

        match received {
            Ok(event) => {
                if let Some(violation) = tracker.observe(event) {
                    shared.register_violation(Violation::from(violation));
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Environment listener lagged, {} events dropped", missed);
            }
            Err(RecvError::Closed) => {
                debug!("Environment source closed");
                break;
            }
        }
    }
}

async fn run_snapshot_schedule(
    shared: Arc<SessionShared>,
    warmup: Duration,
    period: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(warmup) => {}
    }
    shared.capture_snapshot(None);

    let mut cadence = interval_at(Instant::now() + period, period);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {
                shared.capture_snapshot(None);
            }
        }
    }
}

async fn run_audio_sampling(
    shared: Arc<SessionShared>,
    context: SharedAnalysisContext,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut cadence = interval_at(Instant::now() + period, period);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {
                shared.sample_audio(&context);
            }
        }
    }
}

async fn run_report_schedule(
    shared: Arc<SessionShared>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut cadence = interval_at(Instant::now() + period, period);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {
                shared.spawn_report();
            }
        }
    }
}
