//! Integrity event log.
//!
//! # PRIVACY INVARIANT
//! Telemetry events must **NEVER** contain media (frames, JPEG bytes, PCM).
//! Only kinds, counts, categories, media ids and timestamps are allowed.
//!
//! The log is observational: nothing in the detection path reads it back.

pub mod event;
pub mod metrics;
pub mod recorder;
