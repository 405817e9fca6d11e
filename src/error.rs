//! Session-level error taxonomy
//!
//! Every variant is terminal for one action only; the reducer turns it into a
//! status line and returns to the last stable phase.

use crate::service::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Capture capability refused
    PermissionDenied(String),
    /// Upload requested before any recording exists
    NoRecording,
    /// Generation requested before a voice profile exists
    MissingProfile,
    /// Callout message is empty after trimming
    EmptyMessage,
    /// Service answered non-2xx with an error message
    ServiceError { status: u16, message: String },
    /// Request did not complete or the response was unusable
    NetworkError(String),
    /// Captured chunks could not be assembled into an artifact
    CaptureFailed(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::PermissionDenied(e) => write!(f, "Microphone permission denied: {}", e),
            SessionError::NoRecording => write!(f, "No recording available"),
            SessionError::MissingProfile => write!(f, "No voice profile uploaded"),
            SessionError::EmptyMessage => write!(f, "Callout message is empty"),
            SessionError::ServiceError { status, message } => {
                write!(f, "Service error ({}): {}", status, message)
            }
            SessionError::NetworkError(e) => write!(f, "Network error: {}", e),
            SessionError::CaptureFailed(e) => write!(f, "Capture failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ServiceError> for SessionError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ApiError { status, message } => {
                SessionError::ServiceError { status, message }
            }
            other => SessionError::NetworkError(other.to_string()),
        }
    }
}
