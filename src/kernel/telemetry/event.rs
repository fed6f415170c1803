use serde::{Deserialize, Serialize};

use crate::kernel::event::SnapshotCategory;

// Allowed: ids, timestamps, counts, enums
// Forbidden: frames, audio, encoded images

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrityEvent {
    VoiceDetected,
    FaceMissing,
    MultipleFaces { face_count: u32 },
    TabSwitched,
    FullscreenExited,

    SnapshotUploaded {
        media_id: String,
        category: SnapshotCategory,
    },
    SnapshotUploadFailed,

    RecordCreated,
    RecordCreationFailed,

    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    SessionStarted,
    SessionStopped,
    CameraUnavailable,
    MicrophoneUnavailable,
    StartFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub at_ms: u64,
    pub event: IntegrityEvent,
}
