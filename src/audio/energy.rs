/// Root-mean-square of a buffer. Empty buffers are silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sq_sum: f32 = samples.iter().map(|&x| x * x).sum();
    (sq_sum / samples.len() as f32).sqrt()
}

/// Loudness of a time-domain buffer in dB (`20 * log10(rms)`).
/// Silence is `-inf`.
pub fn energy_db(samples: &[f32]) -> f32 {
    let rms = rms(samples);
    if rms == 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * rms.log10()
}

/// Cheap loudness pre-filter in front of the voice classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyGate {
    threshold_db: f32,
}

impl EnergyGate {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    /// Strictly above threshold. `-inf` and NaN never pass.
    pub fn passes(&self, energy_db: f32) -> bool {
        energy_db > self.threshold_db
    }

    /// Measures a buffer and reports `(energy_db, passes)`.
    pub fn measure(&self, samples: &[f32]) -> (f32, bool) {
        let db = energy_db(samples);
        (db, self.passes(db))
    }
}
