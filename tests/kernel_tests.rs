use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;

use proctor::audio::sample::AudioSample;
use proctor::kernel::cooldown::CooldownGate;
use proctor::kernel::event::SnapshotCategory;
use proctor::kernel::gate::{run_callback, DeliveryGate};
use proctor::kernel::telemetry::event::{IntegrityEvent, LifecycleEvent};
use proctor::kernel::telemetry::recorder::TelemetryRecorder;
use proctor::kernel::time::{Clock, ManualClock};
use proctor::media::SampleWindow;
use proctor::session::{EnvironmentBus, EnvironmentEvent, PageViolation, TransitionTracker};

#[test]
fn test_cooldown_window_boundaries() {
    let mut gate = CooldownGate::new(5_000);
    assert!(gate.try_fire(0));
    assert!(!gate.try_fire(2_000));
    assert!(!gate.try_fire(4_999));
    // Blocked attempts do not push the window out
    assert!(gate.try_fire(5_000));
    assert_eq!(gate.last_fired_at(), Some(5_000));

    gate.reset();
    assert!(gate.is_open(5_001));
}

#[test]
fn test_cooldown_with_manual_clock() {
    let clock = ManualClock::new(0);
    let mut gate = CooldownGate::new(5_000);
    let mut fired = 0;

    for _ in 0..4 {
        if gate.try_fire(clock.now_ms()) {
            fired += 1;
        }
        clock.advance(2_000);
    }
    // t = 0, 2000, 4000, 6000
    assert_eq!(fired, 2);
}

#[test]
fn test_tab_switch_transitions() {
    let mut tracker = TransitionTracker::new();
    let hide = EnvironmentEvent::VisibilityChanged { hidden: true };
    let show = EnvironmentEvent::VisibilityChanged { hidden: false };

    assert_eq!(tracker.observe(show), None);
    assert_eq!(tracker.observe(hide), Some(PageViolation::TabSwitch));
    assert_eq!(tracker.observe(hide), None);
    assert_eq!(tracker.observe(show), None);
    assert_eq!(tracker.observe(hide), Some(PageViolation::TabSwitch));
}

#[test]
fn test_fullscreen_exit_transitions() {
    let mut tracker = TransitionTracker::new();
    let enter = EnvironmentEvent::FullscreenChanged { active: true };
    let exit = EnvironmentEvent::FullscreenChanged { active: false };

    // Initial state unknown: the first "not fullscreen" counts
    assert_eq!(tracker.observe(exit), Some(PageViolation::FullscreenExit));
    assert_eq!(tracker.observe(exit), None);
    assert_eq!(tracker.observe(enter), None);
    assert_eq!(tracker.observe(exit), Some(PageViolation::FullscreenExit));
}

#[tokio::test]
async fn test_environment_bus_fan_out() {
    let bus = EnvironmentBus::new(8);
    assert_eq!(bus.hide(), 0, "no listeners yet");

    let mut rx = proctor::session::EnvironmentEvents::subscribe(&bus);
    assert_eq!(bus.listener_count(), 1);
    assert_eq!(bus.exit_fullscreen(), 1);
    assert_eq!(
        rx.recv().await.unwrap(),
        EnvironmentEvent::FullscreenChanged { active: false }
    );
}

#[test]
fn test_snapshot_category_follows_upload_order() {
    assert_eq!(SnapshotCategory::resolve(None, 0), SnapshotCategory::ExamStart);
    assert_eq!(
        SnapshotCategory::resolve(Some(SnapshotCategory::NoFace), 0),
        SnapshotCategory::ExamStart
    );
    assert_eq!(SnapshotCategory::resolve(None, 1), SnapshotCategory::RegularInterval);
    assert_eq!(
        SnapshotCategory::resolve(Some(SnapshotCategory::MultipleFace), 3),
        SnapshotCategory::MultipleFace
    );
    assert_eq!(SnapshotCategory::NoFace.as_str(), "no_face");
}

#[test]
fn test_delivery_gate_blocks_after_close() {
    let gate = DeliveryGate::new();
    let runs = AtomicUsize::new(0);

    assert!(gate.deliver(|| {
        runs.fetch_add(1, Ordering::SeqCst);
    }));
    gate.close();
    assert!(!gate.is_open());
    assert!(!gate.deliver(|| {
        runs.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_callback_is_swallowed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let callback = move |value: u32| -> anyhow::Result<()> {
        counter.fetch_add(value as usize, Ordering::SeqCst);
        anyhow::bail!("boom")
    };

    run_callback("test", &callback, 2);
    run_callback("test", &callback, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn test_telemetry_recorder_is_bounded() {
    let mut recorder = TelemetryRecorder::new();
    for i in 0..10_050u64 {
        recorder.record(i, IntegrityEvent::TabSwitched);
    }
    assert_eq!(recorder.len(), 10_000);
    assert_eq!(recorder.entries().next().unwrap().at_ms, 50, "oldest dropped first");
}

#[test]
fn test_telemetry_summary() {
    let mut recorder = TelemetryRecorder::new();
    recorder.record(0, IntegrityEvent::Lifecycle(LifecycleEvent::SessionStarted));
    recorder.record(100, IntegrityEvent::VoiceDetected);
    recorder.record(
        200,
        IntegrityEvent::SnapshotUploaded {
            media_id: "m1".to_string(),
            category: SnapshotCategory::ExamStart,
        },
    );
    recorder.record(
        300,
        IntegrityEvent::SnapshotUploaded {
            media_id: "m2".to_string(),
            category: SnapshotCategory::NoFace,
        },
    );
    recorder.record(400, IntegrityEvent::FaceMissing);
    recorder.record(500, IntegrityEvent::MultipleFaces { face_count: 3 });
    recorder.record(600, IntegrityEvent::SnapshotUploadFailed);
    recorder.record(700, IntegrityEvent::RecordCreated);
    recorder.record(900, IntegrityEvent::FullscreenExited);

    let summary = recorder.summary();
    assert_eq!(summary.sessions_started, 1);
    assert_eq!(summary.violations.voice, 1);
    assert_eq!(summary.violations.face_missing, 1);
    assert_eq!(summary.violations.multiple_faces, 1);
    assert_eq!(summary.violations.fullscreen_exits, 1);
    assert_eq!(summary.violations.span_ms, 800);
    assert_eq!(summary.snapshots.uploaded, 2);
    assert_eq!(summary.snapshots.exam_start, 1);
    assert_eq!(summary.snapshots.violation_triggered, 1);
    assert_eq!(summary.snapshots.failed, 1);
    assert_eq!(summary.records.created, 1);

    recorder.clear();
    assert!(recorder.is_empty());
}

#[test]
fn test_sample_window_keeps_latest() {
    let window = SampleWindow::new(4, 16_000);
    let mut out = [9.0f32; 6];

    window.push(&[1.0, 2.0]);
    assert_eq!(window.latest(&mut out), 2);
    assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);

    window.push(&[3.0, 4.0, 5.0]);
    let mut short = [0.0f32; 3];
    assert_eq!(window.latest(&mut short), 3);
    assert_eq!(short, [3.0, 4.0, 5.0]);
    assert_eq!(window.len(), 4);
}

#[test]
fn test_audio_sample_wav() {
    let sample = AudioSample {
        samples: vec![0.0, 0.25, -0.25, 0.5],
        sample_rate: 16_000,
        captured_at: Utc::now(),
    };
    let wav = sample.encode_wav().unwrap();
    assert_eq!(&wav[..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");

    let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    let decoded: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, sample.samples);

    let long = AudioSample {
        samples: vec![0.0; 8_000],
        sample_rate: 16_000,
        captured_at: Utc::now(),
    };
    assert_eq!(long.duration_ms(), 500);
}
