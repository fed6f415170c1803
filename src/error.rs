use thiserror::Error;

use crate::media::MediaKind;

/// Failure taxonomy of the proctoring pipeline.
///
/// None of these are fatal to the host: every call site either degrades the
/// affected modality to "inactive" or logs and carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProctorError {
    #[error("{kind} access denied: {reason}")]
    PermissionDenied { kind: MediaKind, reason: String },

    #[error("{kind} unavailable: {reason}")]
    DeviceUnavailable { kind: MediaKind, reason: String },

    #[error("detection failed: {0}")]
    DetectionFailure(String),

    #[error("callback failed: {0}")]
    CallbackFailure(String),

    #[error("snapshot upload failed: {0}")]
    UploadFailure(String),

    #[error("monitoring record creation failed: {0}")]
    RecordCreationFailure(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("audio analysis context is closed")]
    ContextClosed,
}

impl ProctorError {
    /// True for the acquisition failures that only switch a modality off.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            ProctorError::PermissionDenied { .. } | ProctorError::DeviceUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProctorError>;
