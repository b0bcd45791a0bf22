/// Caller-visible errors
///
/// Only faults that affect the ability to hear speech end up here. Keep-alive
/// and wake-lock failures have their own error types and are absorbed by
/// their controllers.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EarError {
    #[error("SpeechRecognition is not supported on this platform")]
    CapabilityUnavailable,

    #[error("Speech recognition error: {code}")]
    Session { code: String, message: String },

    #[error("Failed to start recognition: {0}")]
    StartFailed(String),

    #[error("Invalid phrase: {0}")]
    InvalidPhrase(String),
}

impl EarError {
    /// Whether calling `start()` again can succeed without the platform changing
    pub fn is_retryable(&self) -> bool {
        matches!(self, EarError::Session { .. } | EarError::StartFailed(_))
    }
}
