//! Wake Ear - continuous wake/stop phrase listening
//!
//! This library drives a streaming speech recognizer to listen for wake and
//! stop phrases across several languages:
//! - Substring phrase matching with stop-before-wake priority
//! - Round-robin language rotation across session restarts
//! - Inaudible audio keep-alive and screen wake lock for mobile hosts
//! - An explicit session state machine testable without a real engine

pub mod config;
pub mod ear;
pub mod error;
pub mod keepalive;
pub mod phrase;
pub mod recognition;
pub mod rotation;
pub mod session;
pub mod wakelock;

pub use config::{ConfigError, EarConfig, DEFAULT_LANGUAGE};
pub use ear::{Capabilities, Ear, EarCallbacks, EarEvent, EarHandle};
pub use error::EarError;
pub use keepalive::{AudioOutput, KeepAliveController, KeepAliveError, NoAudioOutput, ToneGraph, ToneSpec};
pub use phrase::{Detection, MatchOutcome, Phrase, PhraseInput, PhraseMatcher, PhraseSet};
pub use recognition::{
    Alternative, RecognitionBackend, RecognitionError, RecognitionResult, RecognitionResults,
    RecognitionSession, SessionEvent, SessionEventSink, SessionId, SessionOptions,
};
pub use rotation::LanguageRotator;
pub use session::{Activity, Effect, Input, SessionManager, SessionState, DEFAULT_RESTART_DELAY};
pub use wakelock::{NoScreenWakeLock, ScreenWakeLock, Visibility, WakeLockController, WakeLockError, WakeLockSentinel};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wake_ear=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_library_exports() {
        let _config = EarConfig::default();
        let _tone = ToneSpec::default();
        let _manager = SessionManager::default();
    }
}
