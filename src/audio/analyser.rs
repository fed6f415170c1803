use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::config::AnalyserOptions;
use crate::error::{ProctorError, Result};
use crate::media::{MediaKind, MediaStream, SampleWindow};

/// A readable analysis tap on a microphone stream.
pub trait AnalysisNode: Send {
    fn fft_size(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Latest `fft_size` samples. `out.len()` must equal `fft_size`.
    fn read_time_domain(&mut self, out: &mut [f32]) -> Result<()>;

    /// Per-bin magnitude in dB. `out.len()` must equal `fft_size / 2`.
    fn read_frequency_db(&mut self, out: &mut [f32]) -> Result<()>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Builds analysis nodes for acquired streams.
pub trait AudioAnalysis: Send + Sync {
    fn create(
        &self,
        stream: &Arc<dyn MediaStream>,
        options: &AnalyserOptions,
    ) -> Result<Box<dyn AnalysisNode>>;
}

/// Default analysis backend: an FFT over the stream's sample window.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectrumAnalysis;

impl AudioAnalysis for SpectrumAnalysis {
    fn create(
        &self,
        stream: &Arc<dyn MediaStream>,
        options: &AnalyserOptions,
    ) -> Result<Box<dyn AnalysisNode>> {
        let window = stream.audio_tap().ok_or_else(|| ProctorError::DeviceUnavailable {
            kind: MediaKind::Microphone,
            reason: format!("stream {} carries no audio", stream.id()),
        })?;
        Ok(Box::new(SpectrumAnalyser::new(window, options)))
    }
}

/// Blackman-windowed FFT with exponential smoothing between reads.
pub struct SpectrumAnalyser {
    window: Arc<SampleWindow>,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    smoothing: f32,
    blackman: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    closed: bool,
}

impl SpectrumAnalyser {
    pub fn new(window: Arc<SampleWindow>, options: &AnalyserOptions) -> Self {
        let fft_size = options.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            window,
            fft,
            fft_size,
            smoothing: options.smoothing.clamp(0.0, 1.0),
            blackman: blackman_window(fft_size),
            frame: vec![0.0; fft_size],
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; fft_size / 2],
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(ProctorError::ContextClosed);
        }
        Ok(())
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

fn check_len(what: &str, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(ProctorError::DetectionFailure(format!(
            "{} buffer has {} slots, expected {}",
            what, got, want
        )));
    }
    Ok(())
}

impl AnalysisNode for SpectrumAnalyser {
    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn sample_rate(&self) -> u32 {
        self.window.sample_rate()
    }

    fn read_time_domain(&mut self, out: &mut [f32]) -> Result<()> {
        self.check_open()?;
        check_len("time-domain", out.len(), self.fft_size)?;
        self.window.latest(out);
        Ok(())
    }

    fn read_frequency_db(&mut self, out: &mut [f32]) -> Result<()> {
        self.check_open()?;
        check_len("frequency-domain", out.len(), self.fft_size / 2)?;

        self.window.latest(&mut self.frame);
        for ((bin, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(self.frame.iter())
            .zip(self.blackman.iter())
        {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let keep = self.smoothing;
        for ((smoothed, bin), db) in self
            .smoothed
            .iter_mut()
            .zip(self.spectrum.iter())
            .zip(out.iter_mut())
        {
            let magnitude = bin.norm() * scale;
            *smoothed = keep * *smoothed + (1.0 - keep) * magnitude;
            // log10(0) is -inf, which is what silent bins should read as.
            *db = 20.0 * smoothed.log10();
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!("Spectrum analyser closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Analysis node plus its two read buffers, sized once at creation.
pub struct AudioAnalysisContext {
    node: Box<dyn AnalysisNode>,
    time_domain: Vec<f32>,
    frequency_db: Vec<f32>,
    closed: bool,
}

pub type SharedAnalysisContext = Arc<Mutex<AudioAnalysisContext>>;

impl AudioAnalysisContext {
    pub fn new(node: Box<dyn AnalysisNode>) -> Self {
        let fft_size = node.fft_size();
        Self {
            node,
            time_domain: vec![0.0; fft_size],
            frequency_db: vec![f32::NEG_INFINITY; fft_size / 2],
            closed: false,
        }
    }

    pub fn shared(node: Box<dyn AnalysisNode>) -> SharedAnalysisContext {
        Arc::new(Mutex::new(Self::new(node)))
    }

    pub fn fft_size(&self) -> usize {
        self.node.fft_size()
    }

    pub fn sample_rate(&self) -> u32 {
        self.node.sample_rate()
    }

    pub fn time_domain_len(&self) -> usize {
        self.time_domain.len()
    }

    pub fn frequency_len(&self) -> usize {
        self.frequency_db.len()
    }

    pub fn read_time_domain(&mut self) -> Result<&[f32]> {
        if self.closed {
            return Err(ProctorError::ContextClosed);
        }
        self.node.read_time_domain(&mut self.time_domain)?;
        Ok(&self.time_domain)
    }

    pub fn read_frequency_db(&mut self) -> Result<&[f32]> {
        if self.closed {
            return Err(ProctorError::ContextClosed);
        }
        self.node.read_frequency_db(&mut self.frequency_db)?;
        Ok(&self.frequency_db)
    }

    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.node.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
