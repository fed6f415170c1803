pub mod analyser;
pub mod capture;
pub mod detection;
pub mod energy;
pub mod sample;
pub mod voice;

pub use analyser::{AnalysisNode, AudioAnalysis, AudioAnalysisContext, SpectrumAnalysis};
pub use detection::{AudioDetectionLoop, AudioLoopStatus, VoicePipeline};
pub use energy::{energy_db, EnergyGate};
pub use voice::VoiceClassifier;
