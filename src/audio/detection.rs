use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::analyser::{AudioAnalysis, AudioAnalysisContext, SharedAnalysisContext};
use super::energy::EnergyGate;
use super::voice::VoiceClassifier;
use crate::config::{AnalyserOptions, ProctorConfig, VoiceConfig};
use crate::error::{ProctorError, Result};
use crate::kernel::cooldown::CooldownGate;
use crate::kernel::event::{DetectionState, VoiceCallback, VoiceEvent};
use crate::kernel::gate::{run_callback, DeliveryGate};
use crate::kernel::sync::{lock, read, write};
use crate::kernel::time::{Clock, TokioClock};
use crate::media::{MediaCapture, MediaConstraints, MediaKind, MediaStream};

/// Result of one analysis tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub energy_db: f32,
    pub is_voice: bool,
    /// Set only when the cooldown let this detection through.
    pub event: Option<VoiceEvent>,
}

/// Gate -> classifier -> cooldown, one step per tick. No I/O, no timers.
#[derive(Debug, Clone)]
pub struct VoicePipeline {
    gate: EnergyGate,
    classifier: VoiceClassifier,
    cooldown: CooldownGate,
}

impl VoicePipeline {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            gate: EnergyGate::new(config.gate_threshold_db),
            classifier: VoiceClassifier::from_config(config),
            cooldown: CooldownGate::new(config.cooldown_ms),
        }
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// The frequency buffer is only read when the energy gate passes.
    pub fn step(&mut self, context: &mut AudioAnalysisContext, now_ms: u64) -> Result<TickOutcome> {
        let (energy_db, loud) = self.gate.measure(context.read_time_domain()?);
        if !loud {
            return Ok(TickOutcome {
                energy_db,
                is_voice: false,
                event: None,
            });
        }

        let sample_rate = context.sample_rate();
        let fft_size = context.fft_size();
        let is_voice = self
            .classifier
            .classify(context.read_frequency_db()?, sample_rate, fft_size);

        let event = if is_voice && self.cooldown.try_fire(now_ms) {
            Some(VoiceEvent {
                energy_db,
                at_ms: now_ms,
            })
        } else {
            None
        };

        Ok(TickOutcome {
            energy_db,
            is_voice,
            event,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioLoopStatus {
    /// Never started, or the microphone could not be acquired.
    Uninitialized,
    Running,
    Stopped,
}

struct RunningAudio {
    /// Only set when this loop acquired the stream itself.
    owned_stream: Option<Arc<dyn MediaStream>>,
    context: SharedAnalysisContext,
    owns_context: bool,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    gate: Arc<DeliveryGate>,
}

/// Continuous voice detection over a microphone.
///
/// Either acquires its own microphone (`enable`) or runs against a context
/// owned by someone else (`start_with_context`), in which case `disable`
/// leaves the stream and the context to their owner.
pub struct AudioDetectionLoop {
    voice: VoiceConfig,
    analyser: AnalyserOptions,
    capture: Arc<dyn MediaCapture>,
    analysis: Arc<dyn AudioAnalysis>,
    clock: Arc<dyn Clock>,
    on_voice: Option<VoiceCallback>,
    state: Arc<RwLock<DetectionState>>,
    status: AudioLoopStatus,
    last_error: Option<ProctorError>,
    invalid: Option<ProctorError>,
    running: Option<RunningAudio>,
}

impl AudioDetectionLoop {
    pub fn new(
        config: &ProctorConfig,
        capture: Arc<dyn MediaCapture>,
        analysis: Arc<dyn AudioAnalysis>,
    ) -> Self {
        Self {
            voice: config.voice.clone(),
            analyser: config.analyser.clone(),
            capture,
            analysis,
            clock: Arc::new(TokioClock::new()),
            on_voice: None,
            state: Arc::new(RwLock::new(DetectionState::default())),
            status: AudioLoopStatus::Uninitialized,
            last_error: None,
            invalid: config.validate().err(),
            running: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a detection state record with other writers (the face loop).
    pub fn with_state(mut self, state: Arc<RwLock<DetectionState>>) -> Self {
        self.state = state;
        self
    }

    pub fn on_voice(mut self, callback: VoiceCallback) -> Self {
        self.on_voice = Some(callback);
        self
    }

    pub fn status(&self) -> AudioLoopStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&ProctorError> {
        self.last_error.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn state(&self) -> DetectionState {
        read(&self.state).clone()
    }

    pub fn context(&self) -> Option<SharedAnalysisContext> {
        self.running.as_ref().map(|r| r.context.clone())
    }

    pub async fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            // Failure is already logged and reflected in `status()`.
            let _ = self.enable().await;
        } else {
            self.disable();
        }
    }

    /// Acquires the microphone, builds the analysis context and starts ticking.
    /// On failure nothing is left running and the status is `Uninitialized`.
    pub async fn enable(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        if let Some(e) = self.invalid.clone() {
            warn!("Voice detection not started: {}", e);
            self.last_error = Some(e.clone());
            return Err(e);
        }

        let stream = match self
            .capture
            .request(MediaKind::Microphone, &MediaConstraints::microphone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Voice detection not started: {}", e);
                self.status = AudioLoopStatus::Uninitialized;
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let node = match self.analysis.create(&stream, &self.analyser) {
            Ok(node) => node,
            Err(e) => {
                warn!("Voice detection not started, analysis unavailable: {}", e);
                stream.stop_all();
                self.status = AudioLoopStatus::Uninitialized;
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let context = AudioAnalysisContext::shared(node);
        self.spawn(context, Some(stream), true);
        Ok(())
    }

    /// Runs against an externally owned analysis context.
    pub fn start_with_context(&mut self, context: SharedAnalysisContext) {
        if self.running.is_some() {
            return;
        }
        if let Some(e) = &self.invalid {
            warn!("Voice detection not started: {}", e);
            self.last_error = Some(e.clone());
            return;
        }
        self.spawn(context, None, false);
    }

    fn spawn(
        &mut self,
        context: SharedAnalysisContext,
        owned_stream: Option<Arc<dyn MediaStream>>,
        owns_context: bool,
    ) {
        let cancel = CancellationToken::new();
        let gate = Arc::new(DeliveryGate::new());

        let task = tokio::spawn(run_voice_loop(
            VoicePipeline::new(&self.voice),
            context.clone(),
            self.state.clone(),
            self.clock.clone(),
            self.on_voice.clone(),
            gate.clone(),
            cancel.clone(),
            Duration::from_millis(self.voice.tick_interval_ms),
        ));

        info!(
            "Voice detection started (tick {}ms, cooldown {}ms)",
            self.voice.tick_interval_ms, self.voice.cooldown_ms
        );

        self.running = Some(RunningAudio {
            owned_stream,
            context,
            owns_context,
            cancel,
            task,
            gate,
        });
        self.status = AudioLoopStatus::Running;
        self.last_error = None;
    }

    /// Synchronous and idempotent. No voice callback runs after this returns.
    pub fn disable(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.gate.close();
        if let Some(stream) = &running.owned_stream {
            stream.stop_all();
        }
        if running.owns_context {
            lock(&running.context).close();
        }
        running.cancel.cancel();
        running.task.abort();

        {
            let mut state = write(&self.state);
            state.current_energy_db = f32::NEG_INFINITY;
            state.is_voice_active = false;
        }
        self.status = AudioLoopStatus::Stopped;
        info!("Voice detection stopped");
    }
}

impl Drop for AudioDetectionLoop {
    fn drop(&mut self) {
        self.disable();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_voice_loop(
    mut pipeline: VoicePipeline,
    context: SharedAnalysisContext,
    state: Arc<RwLock<DetectionState>>,
    clock: Arc<dyn Clock>,
    on_voice: Option<VoiceCallback>,
    gate: Arc<DeliveryGate>,
    cancel: CancellationToken,
    tick: Duration,
) {
    let mut cadence = tokio::time::interval(tick);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {}
        }

        let now_ms = clock.now_ms();
        let outcome = {
            let mut ctx = lock(&context);
            if ctx.is_closed() {
                debug!("Analysis context closed, voice loop exiting");
                break;
            }
            pipeline.step(&mut ctx, now_ms)
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // A bad tick is not fatal; try again next frame.
                let err = match e {
                    ProctorError::DetectionFailure(_) => e,
                    other => ProctorError::DetectionFailure(other.to_string()),
                };
                warn!("{}", err);
                continue;
            }
        };

        let delivered = gate.deliver(|| {
            {
                let mut s = write(&state);
                s.current_energy_db = outcome.energy_db;
                s.is_voice_active = outcome.is_voice;
            }
            if let Some(event) = outcome.event.clone() {
                debug!("Voice detected at {}ms ({:.1} dB)", event.at_ms, event.energy_db);
                if let Some(cb) = &on_voice {
                    run_callback("voice", cb.as_ref(), event);
                }
            }
        });

        if !delivered {
            break;
        }
        trace!("voice tick {}ms energy {:.1} dB", now_ms, outcome.energy_db);
    }
}
