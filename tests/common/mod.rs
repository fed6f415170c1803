#![allow(dead_code)]

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use proctor::audio::analyser::{AnalysisNode, AudioAnalysis, SpectrumAnalyser};
use proctor::config::AnalyserOptions;
use proctor::error::{ProctorError, Result};
use proctor::media::{MediaCapture, MediaConstraints, MediaKind, MediaStream, MediaTrack, SampleWindow};
use proctor::services::{
    MediaUploader, MonitoringRecord, MonitoringRecordRequest, MonitoringRecordSink, SnapshotUpload,
    UploadedMedia,
};
use proctor::vision::{FaceBox, FaceDetection, FaceDetector};

pub const SAMPLE_RATE: u32 = 48_000;

pub fn sine(freq_hz: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Deterministic pseudo-noise in [-amplitude, amplitude].
pub fn noise(amplitude: f32, len: usize) -> Vec<f32> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32 * 2.0 - 1.0) * amplitude
        })
        .collect()
}

/// A window of recent PCM already holding `samples`.
pub fn filled_window(samples: &[f32]) -> Arc<SampleWindow> {
    let window = Arc::new(SampleWindow::new(SAMPLE_RATE as usize * 2, SAMPLE_RATE));
    window.push(samples);
    window
}

// -------------------------------------------------------------------------
// Streams and capture

pub struct FakeStream {
    id: String,
    kind: MediaKind,
    tracks: Vec<Arc<MediaTrack>>,
    window: Option<Arc<SampleWindow>>,
    frame: Mutex<Option<(u32, u32)>>,
    released: AtomicUsize,
}

impl FakeStream {
    pub fn camera(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: MediaKind::Camera,
            tracks: vec![Arc::new(MediaTrack::new(MediaKind::Camera, "fake camera"))],
            window: None,
            frame: Mutex::new(Some((width, height))),
            released: AtomicUsize::new(0),
        })
    }

    pub fn microphone(window: Arc<SampleWindow>) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: MediaKind::Microphone,
            tracks: vec![Arc::new(MediaTrack::new(MediaKind::Microphone, "fake mic"))],
            window: Some(window),
            frame: Mutex::new(None),
            released: AtomicUsize::new(0),
        })
    }

    pub fn set_frame(&self, frame: Option<(u32, u32)>) {
        *self.frame.lock().unwrap() = frame;
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn audio_tap(&self) -> Option<Arc<SampleWindow>> {
        self.window.clone()
    }

    fn frame_dimensions(&self) -> Option<(u32, u32)> {
        *self.frame.lock().unwrap()
    }

    fn read_frame(&self, target: &mut RgbImage) -> bool {
        if self.frame_dimensions().is_none() {
            return false;
        }
        for pixel in target.pixels_mut() {
            *pixel = Rgb([120, 90, 60]);
        }
        true
    }
}

/// Hands out fake streams, or fails per kind.
pub struct FakeCapture {
    camera_error: Option<ProctorError>,
    microphone_error: Option<ProctorError>,
    audio: Vec<f32>,
    frame: (u32, u32),
    issued: Mutex<Vec<Arc<FakeStream>>>,
    requests: AtomicUsize,
}

impl FakeCapture {
    /// Camera 64x48, microphone carrying a steady 150 Hz tone.
    pub fn new() -> Self {
        Self {
            camera_error: None,
            microphone_error: None,
            audio: sine(150.0, 0.5, 4096, SAMPLE_RATE),
            frame: (64, 48),
            issued: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            audio: vec![0.0; 4096],
            ..Self::new()
        }
    }

    pub fn with_audio(mut self, samples: Vec<f32>) -> Self {
        self.audio = samples;
        self
    }

    pub fn deny_camera(mut self) -> Self {
        self.camera_error = Some(ProctorError::PermissionDenied {
            kind: MediaKind::Camera,
            reason: "denied by user".to_string(),
        });
        self
    }

    pub fn deny_microphone(mut self) -> Self {
        self.microphone_error = Some(ProctorError::PermissionDenied {
            kind: MediaKind::Microphone,
            reason: "denied by user".to_string(),
        });
        self
    }

    pub fn issued(&self) -> Vec<Arc<FakeStream>> {
        self.issued.lock().unwrap().clone()
    }

    pub fn issued_of(&self, kind: MediaKind) -> Vec<Arc<FakeStream>> {
        self.issued()
            .into_iter()
            .filter(|s| s.kind() == kind)
            .collect()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn live_tracks(&self) -> usize {
        self.issued().iter().map(|s| s.active_track_count()).sum()
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn request(
        &self,
        kind: MediaKind,
        _constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let (error, stream) = match kind {
            MediaKind::Camera => (
                self.camera_error.clone(),
                FakeStream::camera(self.frame.0, self.frame.1),
            ),
            MediaKind::Microphone => (
                self.microphone_error.clone(),
                FakeStream::microphone(filled_window(&self.audio)),
            ),
        };
        if let Some(e) = error {
            return Err(e);
        }
        self.issued.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

// -------------------------------------------------------------------------
// Analysis

#[derive(Default)]
pub struct NodeProbe {
    pub time_reads: AtomicUsize,
    pub frequency_reads: AtomicUsize,
    pub closed: AtomicBool,
    /// Upcoming time-domain reads that fail before the node recovers.
    pub failing_reads: AtomicUsize,
}

impl NodeProbe {
    pub fn frequency_reads(&self) -> usize {
        self.frequency_reads.load(Ordering::SeqCst)
    }

    pub fn time_reads(&self) -> usize {
        self.time_reads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A real spectrum analyser that counts how it is used.
pub struct ProbeNode {
    inner: SpectrumAnalyser,
    probe: Arc<NodeProbe>,
}

impl ProbeNode {
    pub fn new(window: Arc<SampleWindow>, probe: Arc<NodeProbe>) -> Self {
        Self {
            inner: SpectrumAnalyser::new(window, &AnalyserOptions::default()),
            probe,
        }
    }
}

impl AnalysisNode for ProbeNode {
    fn fft_size(&self) -> usize {
        self.inner.fft_size()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read_time_domain(&mut self, out: &mut [f32]) -> Result<()> {
        self.probe.time_reads.fetch_add(1, Ordering::SeqCst);
        if self.probe.take_failure() {
            return Err(ProctorError::DetectionFailure("buffer underrun".to_string()));
        }
        self.inner.read_time_domain(out)
    }

    fn read_frequency_db(&mut self, out: &mut [f32]) -> Result<()> {
        self.probe.frequency_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_frequency_db(out)
    }

    fn close(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[derive(Default)]
pub struct ProbeAnalysis {
    probes: Mutex<Vec<Arc<NodeProbe>>>,
    fail: bool,
    failing_reads: usize,
}

impl ProbeAnalysis {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Nodes whose first `reads` time-domain reads fail.
    pub fn flaky(reads: usize) -> Self {
        Self {
            failing_reads: reads,
            ..Self::default()
        }
    }

    pub fn probes(&self) -> Vec<Arc<NodeProbe>> {
        self.probes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Arc<NodeProbe>> {
        self.probes.lock().unwrap().last().cloned()
    }
}

impl AudioAnalysis for ProbeAnalysis {
    fn create(
        &self,
        stream: &Arc<dyn MediaStream>,
        _options: &AnalyserOptions,
    ) -> Result<Box<dyn AnalysisNode>> {
        if self.fail {
            return Err(ProctorError::DeviceUnavailable {
                kind: MediaKind::Microphone,
                reason: "analysis backend offline".to_string(),
            });
        }
        let window = stream.audio_tap().ok_or_else(|| ProctorError::DeviceUnavailable {
            kind: MediaKind::Microphone,
            reason: "no audio".to_string(),
        })?;
        let probe = Arc::new(NodeProbe {
            failing_reads: AtomicUsize::new(self.failing_reads),
            ..NodeProbe::default()
        });
        self.probes.lock().unwrap().push(probe.clone());
        Ok(Box::new(ProbeNode::new(window, probe)))
    }
}

// -------------------------------------------------------------------------
// Face detector

/// Returns queued face counts in order, then repeats `fallback`.
pub struct FakeDetector {
    script: Mutex<VecDeque<Option<u32>>>,
    fallback: Option<u32>,
    pub loads: AtomicUsize,
    pub releases: AtomicUsize,
    pub calls: AtomicUsize,
    failing_detects: AtomicUsize,
    fail_load: bool,
}

impl FakeDetector {
    pub fn new(fallback: Option<u32>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            loads: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            failing_detects: AtomicUsize::new(0),
            fail_load: false,
        }
    }

    pub fn scripted(counts: &[Option<u32>], fallback: Option<u32>) -> Self {
        let detector = Self::new(fallback);
        detector.script.lock().unwrap().extend(counts.iter().copied());
        detector
    }

    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new(Some(1))
        }
    }

    /// The next `n` detections fail; the script is left untouched.
    pub fn fail_next(&self, n: usize) {
        self.failing_detects.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(ProctorError::DetectionFailure("model missing".to_string()));
        }
        Ok(())
    }

    async fn detect(&self, _frame: &RgbImage) -> Result<Option<FaceDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_detects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProctorError::DetectionFailure("inference crashed".to_string()));
        }
        let next = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        Ok(next.map(|count| FaceDetection {
            faces: (0..count)
                .map(|i| FaceBox {
                    x: i as f32 * 10.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    score: 0.9,
                })
                .collect(),
        }))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// -------------------------------------------------------------------------
// Backend

#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<SnapshotUpload>>,
    fail: AtomicBool,
}

impl RecordingUploader {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<SnapshotUpload> {
        self.uploads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MediaUploader for RecordingUploader {
    async fn upload(&self, upload: SnapshotUpload) -> Result<UploadedMedia> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProctorError::UploadFailure("503 from media endpoint".to_string()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(upload);
        Ok(UploadedMedia {
            id: format!("media-{}", uploads.len()),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<MonitoringRecordRequest>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<MonitoringRecordRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MonitoringRecordSink for RecordingSink {
    async fn create(&self, request: MonitoringRecordRequest) -> Result<MonitoringRecord> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProctorError::RecordCreationFailure("backend down".to_string()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        Ok(MonitoringRecord {
            id: Some(format!("record-{}", requests.len())),
        })
    }
}
