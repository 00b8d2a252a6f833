use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = PilahError> = std::result::Result<T, E>;

/// Unified error type covering every failure the capture cycle can surface.
#[derive(Debug, Error)]
pub enum PilahError {
    #[error("camera access denied: {0}")]
    CameraAccessDenied(String),
    #[error("frame not ready: {0}")]
    FrameNotReady(String),
    #[error("encode failure: {0}")]
    EncodeFailure(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("model load failure: {0}")]
    ModelLoadFailure(String),
    #[error("model not ready: {0}")]
    ModelNotReady(String),
    #[error("inference failure: {0}")]
    InferenceFailure(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid cycle state: {0}")]
    InvalidState(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Serializable discriminant of [`PilahError`], carried inside failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    CameraAccessDenied,
    FrameNotReady,
    EncodeFailure,
    NetworkFailure,
    ModelLoadFailure,
    ModelNotReady,
    InferenceFailure,
    Configuration,
    InvalidState,
    Ops,
    Other,
}

impl PilahError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PilahError::CameraAccessDenied(_) => ErrorKind::CameraAccessDenied,
            PilahError::FrameNotReady(_) => ErrorKind::FrameNotReady,
            PilahError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            PilahError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            PilahError::ModelLoadFailure(_) => ErrorKind::ModelLoadFailure,
            PilahError::ModelNotReady(_) => ErrorKind::ModelNotReady,
            PilahError::InferenceFailure(_) => ErrorKind::InferenceFailure,
            PilahError::Configuration(_) => ErrorKind::Configuration,
            PilahError::InvalidState(_) => ErrorKind::InvalidState,
            PilahError::Ops(_) => ErrorKind::Ops,
            PilahError::Other(_) => ErrorKind::Other,
        }
    }

    /// Message without the variant prefix, suitable for a notification.
    pub fn detail(&self) -> String {
        match self {
            PilahError::CameraAccessDenied(msg)
            | PilahError::FrameNotReady(msg)
            | PilahError::EncodeFailure(msg)
            | PilahError::NetworkFailure(msg)
            | PilahError::ModelLoadFailure(msg)
            | PilahError::ModelNotReady(msg)
            | PilahError::InferenceFailure(msg)
            | PilahError::Configuration(msg)
            | PilahError::InvalidState(msg)
            | PilahError::Ops(msg) => msg.clone(),
            PilahError::Other(err) => format!("{err:#}"),
        }
    }
}
