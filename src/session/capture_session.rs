use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audio::analyser::SharedAnalysisContext;
use crate::audio::AudioDetectionLoop;
use crate::kernel::gate::DeliveryGate;
use crate::kernel::sync::lock;
use crate::media::{MediaStream, VideoSurface};
use crate::vision::FaceDetectionLoop;

/// Every resource one monitoring session acquired.
///
/// Teardown releases them in a fixed order: schedules and loops first, then
/// media tracks, then the audio context, then the preview surface. After
/// `teardown` returns nothing the session spawned will deliver again.
pub struct CaptureSession {
    id: Uuid,
    gate: Arc<DeliveryGate>,
    video: Arc<VideoSurface>,
    camera: Option<Arc<dyn MediaStream>>,
    microphone: Option<Arc<dyn MediaStream>>,
    audio_context: Option<SharedAnalysisContext>,
    audio_loop: Option<AudioDetectionLoop>,
    face_loop: Option<FaceDetectionLoop>,
    cancel: CancellationToken,
    timers: Vec<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
    torn_down: bool,
}

impl CaptureSession {
    pub(crate) fn new(id: Uuid, gate: Arc<DeliveryGate>, video: Arc<VideoSurface>) -> Self {
        Self {
            id,
            gate,
            video,
            camera: None,
            microphone: None,
            audio_context: None,
            audio_loop: None,
            face_loop: None,
            cancel: CancellationToken::new(),
            timers: Vec::new(),
            listeners: Vec::new(),
            torn_down: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn camera(&self) -> Option<&Arc<dyn MediaStream>> {
        self.camera.as_ref()
    }

    pub fn microphone(&self) -> Option<&Arc<dyn MediaStream>> {
        self.microphone.as_ref()
    }

    pub fn audio_context(&self) -> Option<&SharedAnalysisContext> {
        self.audio_context.as_ref()
    }

    pub fn is_voice_running(&self) -> bool {
        self.audio_loop.as_ref().is_some_and(|l| l.is_running())
    }

    pub fn is_face_running(&self) -> bool {
        self.face_loop.as_ref().is_some_and(|l| l.is_running())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Child token for tasks that should die with the session.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub(crate) fn set_camera(&mut self, stream: Arc<dyn MediaStream>) {
        self.camera = Some(stream);
    }

    pub(crate) fn set_microphone(&mut self, stream: Arc<dyn MediaStream>) {
        self.microphone = Some(stream);
    }

    pub(crate) fn set_audio_context(&mut self, context: SharedAnalysisContext) {
        self.audio_context = Some(context);
    }

    pub(crate) fn set_audio_loop(&mut self, audio: AudioDetectionLoop) {
        self.audio_loop = Some(audio);
    }

    pub(crate) fn set_face_loop(&mut self, face: FaceDetectionLoop) {
        self.face_loop = Some(face);
    }

    pub(crate) fn push_timer(&mut self, task: JoinHandle<()>) {
        self.timers.push(task);
    }

    pub(crate) fn push_listener(&mut self, task: JoinHandle<()>) {
        self.listeners.push(task);
    }

    /// Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.gate.close();

        // 1. schedules and detection loops
        self.cancel.cancel();
        for task in self.timers.drain(..) {
            task.abort();
        }
        if let Some(mut audio) = self.audio_loop.take() {
            audio.disable();
        }
        if let Some(mut face) = self.face_loop.take() {
            face.disable();
        }

        // 2. media tracks
        let mut stopped = 0;
        for stream in [self.camera.take(), self.microphone.take()].into_iter().flatten() {
            stopped += stream.active_track_count();
            stream.stop_all();
        }

        // 3. audio context
        if let Some(context) = self.audio_context.take() {
            lock(&context).close();
        }

        // 4. preview surface
        if self.video.detach().is_some() {
            debug!("Video surface detached");
        }
        for task in self.listeners.drain(..) {
            task.abort();
        }

        info!("Capture session {} torn down ({} tracks stopped)", self.id, stopped);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
