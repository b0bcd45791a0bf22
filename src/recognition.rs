/// Speech recognition capability seam
///
/// The recognizer itself (speech-to-text) lives outside this crate. Hosts
/// implement `RecognitionBackend` and forward engine callbacks through the
/// `SessionEventSink` handed to each opened session.

use crate::ear::EarEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Speech recognition unavailable")]
    Unavailable,

    #[error("Failed to start recognition: {0}")]
    Start(String),
}

/// Identity of one opened recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a session should be configured before it begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// One recognition hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// One recognized segment with its hypotheses, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub is_final: bool,
}

/// A batch of results delivered by one result event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResults {
    #[serde(default)]
    pub result_index: usize,
    pub results: Vec<RecognitionResult>,
}

impl RecognitionResults {
    /// A batch holding a single result with one alternative
    pub fn from_transcript(text: &str, is_final: bool) -> Self {
        Self {
            result_index: 0,
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: text.to_string(),
                    confidence: 1.0,
                }],
                is_final,
            }],
        }
    }

    /// Top alternative of the last result; earlier results are superseded
    pub fn latest_transcript(&self) -> Option<&str> {
        self.results
            .last()?
            .alternatives
            .first()
            .map(|a| a.transcript.as_str())
    }
}

/// Engine callbacks for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    Start,
    Result(RecognitionResults),
    Error { error: String, message: String },
    End,
}

/// Delivers one session's engine callbacks into the listener's event queue
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    id: SessionId,
    tx: mpsc::UnboundedSender<EarEvent>,
}

impl SessionEventSink {
    pub(crate) fn new(id: SessionId, tx: mpsc::UnboundedSender<EarEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue an event. Returns false once the listener is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        trace!("Session {} event: {:?}", self.id, event);
        self.tx
            .send(EarEvent::Session { id: self.id, event })
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.emit(SessionEvent::Start)
    }

    pub fn result(&self, results: RecognitionResults) -> bool {
        self.emit(SessionEvent::Result(results))
    }

    pub fn error(&self, error: &str, message: &str) -> bool {
        self.emit(SessionEvent::Error {
            error: error.to_string(),
            message: message.to_string(),
        })
    }

    pub fn ended(&self) -> bool {
        self.emit(SessionEvent::End)
    }
}

/// One live engine instance bound to a single language
pub trait RecognitionSession: Send {
    /// Begin recognizing. Confirmation arrives later as `SessionEvent::Start`.
    fn start(&mut self) -> Result<(), RecognitionError>;

    /// Stop gracefully, letting pending audio finish
    fn stop(&mut self);

    /// Stop immediately, discarding pending audio
    fn abort(&mut self);
}

/// Platform speech recognition capability
pub trait RecognitionBackend: Send {
    /// Whether the platform exposes recognition at all
    fn is_available(&self) -> bool;

    /// Construct a session. Engine callbacks must go through `events`.
    fn open(
        &self,
        options: &SessionOptions,
        events: SessionEventSink,
    ) -> Result<Box<dyn RecognitionSession>, RecognitionError>;
}
