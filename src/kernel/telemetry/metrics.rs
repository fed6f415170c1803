use std::collections::VecDeque;

use super::event::{IntegrityEvent, LifecycleEvent, TelemetryEntry};
use crate::kernel::event::SnapshotCategory;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySummary {
    pub violations: ViolationStats,
    pub snapshots: SnapshotStats,
    pub records: RecordStats,
    pub sessions_started: u64,
    pub sessions_stopped: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationStats {
    pub voice: u64,
    pub face_missing: u64,
    pub multiple_faces: u64,
    pub tab_switches: u64,
    pub fullscreen_exits: u64,
    /// Milliseconds between the first and last violation, 0 with fewer than two.
    pub span_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotStats {
    pub uploaded: u64,
    pub failed: u64,
    pub exam_start: u64,
    pub regular_interval: u64,
    pub violation_triggered: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStats {
    pub created: u64,
    pub failed: u64,
}

pub fn compute_summary(entries: &VecDeque<TelemetryEntry>) -> TelemetrySummary {
    let mut summary = TelemetrySummary::default();

    let mut first_violation: Option<u64> = None;
    let mut last_violation: Option<u64> = None;

    for entry in entries {
        let is_violation = match &entry.event {
            IntegrityEvent::VoiceDetected => {
                summary.violations.voice += 1;
                true
            }
            IntegrityEvent::FaceMissing => {
                summary.violations.face_missing += 1;
                true
            }
            IntegrityEvent::MultipleFaces { .. } => {
                summary.violations.multiple_faces += 1;
                true
            }
            IntegrityEvent::TabSwitched => {
                summary.violations.tab_switches += 1;
                true
            }
            IntegrityEvent::FullscreenExited => {
                summary.violations.fullscreen_exits += 1;
                true
            }
            IntegrityEvent::SnapshotUploaded { category, .. } => {
                summary.snapshots.uploaded += 1;
                match category {
                    SnapshotCategory::ExamStart => summary.snapshots.exam_start += 1,
                    SnapshotCategory::RegularInterval => summary.snapshots.regular_interval += 1,
                    SnapshotCategory::MultipleFace | SnapshotCategory::NoFace => {
                        summary.snapshots.violation_triggered += 1
                    }
                }
                false
            }
            IntegrityEvent::SnapshotUploadFailed => {
                summary.snapshots.failed += 1;
                false
            }
            IntegrityEvent::RecordCreated => {
                summary.records.created += 1;
                false
            }
            IntegrityEvent::RecordCreationFailed => {
                summary.records.failed += 1;
                false
            }
            IntegrityEvent::Lifecycle(LifecycleEvent::SessionStarted) => {
                summary.sessions_started += 1;
                false
            }
            IntegrityEvent::Lifecycle(LifecycleEvent::SessionStopped) => {
                summary.sessions_stopped += 1;
                false
            }
            IntegrityEvent::Lifecycle(_) => false,
        };

        if is_violation {
            first_violation.get_or_insert(entry.at_ms);
            last_violation = Some(entry.at_ms);
        }
    }

    if let (Some(first), Some(last)) = (first_violation, last_violation) {
        summary.violations.span_ms = last.saturating_sub(first);
    }

    summary
}
