use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::environment::PageViolation;
use super::SessionCallbacks;
use crate::audio::analyser::SharedAnalysisContext;
use crate::audio::sample::AudioSample;
use crate::error::ProctorError;
use crate::kernel::cooldown::CooldownGate;
use crate::kernel::event::{
    DetectionState, FaceUpdate, SnapshotCategory, SnapshotRecord, ViolationCounters, VoiceEvent,
};
use crate::kernel::gate::{run_callback, DeliveryGate};
use crate::kernel::sync::lock;
use crate::kernel::telemetry::event::IntegrityEvent;
use crate::kernel::telemetry::recorder::TelemetryRecorder;
use crate::kernel::time::Clock;
use crate::media::VideoSurface;
use crate::services::{
    MediaUploader, MonitoringRecordRequest, MonitoringRecordSink, RecordMetadata, SnapshotUpload,
};
use crate::vision::SnapshotSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    TabSwitch,
    FullscreenExit,
    Voice,
}

impl From<PageViolation> for Violation {
    fn from(v: PageViolation) -> Self {
        match v {
            PageViolation::TabSwitch => Violation::TabSwitch,
            PageViolation::FullscreenExit => Violation::FullscreenExit,
        }
    }
}

/// Edge detector for face violations, cooldown-gated per kind.
#[derive(Debug)]
pub(crate) struct FaceWatch {
    last: Option<FaceUpdate>,
    no_face: CooldownGate,
    multiple: CooldownGate,
}

impl FaceWatch {
    pub(crate) fn new(cooldown_ms: u64) -> Self {
        Self {
            last: None,
            no_face: CooldownGate::new(cooldown_ms),
            multiple: CooldownGate::new(cooldown_ms),
        }
    }

    pub(crate) fn observe(
        &mut self,
        update: FaceUpdate,
        now_ms: u64,
    ) -> Option<(IntegrityEvent, SnapshotCategory)> {
        let previous = self.last.replace(update);
        let entered_missing = !update.has_face && previous.map_or(true, |p| p.has_face);
        let entered_multiple =
            update.has_multiple_faces && previous.map_or(true, |p| !p.has_multiple_faces);

        if entered_missing && self.no_face.try_fire(now_ms) {
            return Some((IntegrityEvent::FaceMissing, SnapshotCategory::NoFace));
        }
        if entered_multiple && self.multiple.try_fire(now_ms) {
            return Some((
                IntegrityEvent::MultipleFaces {
                    face_count: update.face_count,
                },
                SnapshotCategory::MultipleFace,
            ));
        }
        None
    }
}

/// Everything the session's background tasks touch.
///
/// A fresh instance is built for every capture session, which is what resets
/// the counters and the snapshot list. Uploads that outlive their session
/// write into the old instance and are never seen again.
pub(crate) struct SessionShared {
    pub(crate) id: Uuid,
    pub(crate) detection: Arc<RwLock<DetectionState>>,
    pub(crate) gate: Arc<DeliveryGate>,
    enrollment_id: String,
    counters: Mutex<ViolationCounters>,
    snapshots: Mutex<Vec<SnapshotRecord>>,
    surface: Mutex<SnapshotSurface>,
    face_watch: Mutex<FaceWatch>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    clock: Arc<dyn Clock>,
    callbacks: SessionCallbacks,
    video: Arc<VideoSurface>,
    uploader: Option<Arc<dyn MediaUploader>>,
    records: Option<Arc<dyn MonitoringRecordSink>>,
    auto_upload: bool,
    auto_report: bool,
}

pub(crate) struct SharedParts {
    pub enrollment_id: String,
    pub jpeg_quality: u8,
    pub face_cooldown_ms: u64,
    pub telemetry: Arc<Mutex<TelemetryRecorder>>,
    pub clock: Arc<dyn Clock>,
    pub callbacks: SessionCallbacks,
    pub video: Arc<VideoSurface>,
    pub uploader: Option<Arc<dyn MediaUploader>>,
    pub records: Option<Arc<dyn MonitoringRecordSink>>,
    pub auto_upload: bool,
    pub auto_report: bool,
}

impl SessionShared {
    pub(crate) fn new(parts: SharedParts) -> Self {
        Self {
            id: Uuid::new_v4(),
            detection: Arc::new(RwLock::new(DetectionState::default())),
            gate: Arc::new(DeliveryGate::new()),
            enrollment_id: parts.enrollment_id,
            counters: Mutex::new(ViolationCounters::default()),
            snapshots: Mutex::new(Vec::new()),
            surface: Mutex::new(SnapshotSurface::new(parts.jpeg_quality)),
            face_watch: Mutex::new(FaceWatch::new(parts.face_cooldown_ms)),
            telemetry: parts.telemetry,
            clock: parts.clock,
            callbacks: parts.callbacks,
            video: parts.video,
            uploader: parts.uploader,
            records: parts.records,
            auto_upload: parts.auto_upload,
            auto_report: parts.auto_report,
        }
    }

    pub(crate) fn record(&self, event: IntegrityEvent) {
        let now = self.clock.now_ms();
        lock(&self.telemetry).record(now, event);
    }

    pub(crate) fn counters(&self) -> ViolationCounters {
        *lock(&self.counters)
    }

    pub(crate) fn snapshots(&self) -> Vec<SnapshotRecord> {
        lock(&self.snapshots).clone()
    }

    pub(crate) fn snapshot_surface_allocations(&self) -> u64 {
        lock(&self.surface).allocations()
    }

    pub(crate) fn wants_snapshots(&self) -> bool {
        self.callbacks.on_snapshot.is_some() || (self.auto_upload && self.uploader.is_some())
    }

    pub(crate) fn register_violation(self: &Arc<Self>, violation: Violation) {
        let delivered = self.gate.deliver(|| {
            let counters = {
                let mut c = lock(&self.counters);
                match violation {
                    Violation::TabSwitch => c.tab_switch_count += 1,
                    Violation::FullscreenExit => c.fullscreen_exit_count += 1,
                    Violation::Voice => c.voice_detection_count += 1,
                }
                *c
            };
            self.record(match violation {
                Violation::TabSwitch => IntegrityEvent::TabSwitched,
                Violation::FullscreenExit => IntegrityEvent::FullscreenExited,
                Violation::Voice => IntegrityEvent::VoiceDetected,
            });
            info!("Violation {:?} -> {:?}", violation, counters);
            if let Some(cb) = &self.callbacks.on_counters {
                run_callback("counters", cb.as_ref(), counters);
            }
        });

        if delivered && self.auto_report {
            self.spawn_report();
        }
    }

    pub(crate) fn handle_voice(self: &Arc<Self>, event: VoiceEvent) {
        if let Some(cb) = &self.callbacks.on_voice {
            let event = event.clone();
            self.gate.deliver(|| run_callback("voice", cb.as_ref(), event));
        }
        self.register_violation(Violation::Voice);
    }

    pub(crate) fn handle_face(self: &Arc<Self>, update: FaceUpdate) {
        if let Some(cb) = &self.callbacks.on_face {
            self.gate.deliver(|| run_callback("face", cb.as_ref(), update));
        }

        let now = self.clock.now_ms();
        let trigger = lock(&self.face_watch).observe(update, now);
        if let Some((event, category)) = trigger {
            if !self.gate.is_open() {
                return;
            }
            warn!("Face violation: {:?}", event);
            self.record(event);
            self.capture_snapshot(Some(category));
        }
    }

    /// Draws, encodes and hands out one snapshot, then uploads it in the
    /// background when auto-upload is on. Returns false if nothing was taken.
    pub(crate) fn capture_snapshot(self: &Arc<Self>, requested: Option<SnapshotCategory>) -> bool {
        if !self.gate.is_open() {
            return false;
        }

        let captured = lock(&self.surface).capture(self.video.as_ref(), requested);
        let payload = match captured {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("No video frame available for snapshot");
                return false;
            }
            Err(e) => {
                warn!("Snapshot capture failed: {}", e);
                return false;
            }
        };

        let delivered = self.gate.deliver(|| {
            if let Some(cb) = &self.callbacks.on_snapshot {
                run_callback("snapshot", cb.as_ref(), payload.clone());
            }
        });
        if !delivered {
            return false;
        }

        if self.auto_upload {
            if let Some(uploader) = self.uploader.clone() {
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    let file_name = format!("snapshot-{}.jpg", payload.captured_at.timestamp_millis());
                    let upload = SnapshotUpload::jpeg(file_name, payload.jpeg);
                    match uploader.upload(upload).await {
                        Ok(media) => {
                            shared.append_snapshot(media.id, payload.captured_at, payload.requested);
                        }
                        Err(e) => {
                            let err = match e {
                                ProctorError::UploadFailure(_) => e,
                                other => ProctorError::UploadFailure(other.to_string()),
                            };
                            error!("{}", err);
                            shared.record(IntegrityEvent::SnapshotUploadFailed);
                        }
                    }
                });
            }
        }
        true
    }

    fn append_snapshot(
        &self,
        media_id: String,
        captured_at: DateTime<Utc>,
        requested: Option<SnapshotCategory>,
    ) {
        let category = {
            let mut snapshots = lock(&self.snapshots);
            let category = SnapshotCategory::resolve(requested, snapshots.len());
            snapshots.push(SnapshotRecord {
                media_id: media_id.clone(),
                captured_at,
                category,
            });
            category
        };
        info!("Snapshot {} uploaded as {}", media_id, category.as_str());
        self.record(IntegrityEvent::SnapshotUploaded { media_id, category });
    }

    pub(crate) fn record_request(&self) -> MonitoringRecordRequest {
        let counters = self.counters();
        let snapshots = lock(&self.snapshots);
        let exam_start_media_id = snapshots
            .iter()
            .find(|s| s.category == SnapshotCategory::ExamStart)
            .map(|s| s.media_id.clone());

        MonitoringRecordRequest {
            enrollment_id: self.enrollment_id.clone(),
            tab_switch_count: counters.tab_switch_count,
            fullscreen_exit_count: counters.fullscreen_exit_count,
            exam_start_media_id,
            metadata: RecordMetadata {
                snapshot_media_ids: snapshots.iter().map(|s| s.media_id.clone()).collect(),
                voice_detection_count: counters.voice_detection_count,
            },
        }
    }

    /// Fire-and-forget record creation with the cumulative state. Nothing is
    /// sent once the session is torn down.
    pub(crate) fn spawn_report(self: &Arc<Self>) -> bool {
        if !self.gate.is_open() {
            return false;
        }
        let Some(records) = self.records.clone() else {
            return false;
        };
        let request = self.record_request();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            match records.create(request).await {
                Ok(record) => {
                    debug!("Monitoring record created: {:?}", record.id);
                    shared.record(IntegrityEvent::RecordCreated);
                }
                Err(e) => {
                    let err = match e {
                        ProctorError::RecordCreationFailure(_) => e,
                        other => ProctorError::RecordCreationFailure(other.to_string()),
                    };
                    error!("{}", err);
                    shared.record(IntegrityEvent::RecordCreationFailed);
                }
            }
        });
        true
    }

    /// Copies the current time-domain buffer out to the sample callback.
    pub(crate) fn sample_audio(&self, context: &SharedAnalysisContext) -> bool {
        let Some(cb) = &self.callbacks.on_audio_sample else {
            return false;
        };

        let sample = {
            let mut ctx = lock(context);
            if ctx.is_closed() {
                return false;
            }
            let sample_rate = ctx.sample_rate();
            match ctx.read_time_domain() {
                Ok(buffer) => AudioSample {
                    samples: buffer.to_vec(),
                    sample_rate,
                    captured_at: Utc::now(),
                },
                Err(e) => {
                    warn!("Audio sample failed: {}", ProctorError::DetectionFailure(e.to_string()));
                    return false;
                }
            }
        };

        self.gate
            .deliver(|| run_callback("audio sample", cb.as_ref(), sample))
    }
}
