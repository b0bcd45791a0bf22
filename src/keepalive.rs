/// Audio keep-alive
///
/// Plays a near-silent continuous tone so the platform keeps the audio
/// session (and with it the recognizer) running while the screen is off.
/// Every failure here degrades to "no keep-alive" and is only logged.

use thiserror::Error;
use tracing::{debug, info, warn};

/// Tone gain. Exactly zero may be optimised away by the audio stack.
pub const KEEP_ALIVE_GAIN: f32 = 0.001;

/// Default oscillator frequency in Hz
pub const KEEP_ALIVE_FREQUENCY_HZ: f32 = 440.0;

#[derive(Error, Debug)]
pub enum KeepAliveError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    #[error("Audio permission denied")]
    PermissionDenied,

    #[error("Audio graph error: {0}")]
    Graph(String),
}

/// Parameters of the keep-alive tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub gain: f32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency_hz: KEEP_ALIVE_FREQUENCY_HZ,
            gain: KEEP_ALIVE_GAIN,
        }
    }
}

/// A running oscillator -> gain -> output graph
#[cfg_attr(test, mockall::automock)]
pub trait ToneGraph: Send {
    /// Stop the oscillator
    fn stop(&mut self) -> Result<(), KeepAliveError>;

    /// Disconnect oscillator and gain nodes
    fn disconnect(&mut self) -> Result<(), KeepAliveError>;

    /// Close the audio context and free the device
    fn close(&mut self) -> Result<(), KeepAliveError>;
}

/// Platform audio output capability
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send {
    /// Build and start a tone graph routed to the default output
    fn open_tone(&self, spec: &ToneSpec) -> Result<Box<dyn ToneGraph>, KeepAliveError>;
}

/// Opaque handle to one running keep-alive tone
pub struct KeepAliveHandle {
    graph: Box<dyn ToneGraph>,
}

impl KeepAliveHandle {
    /// Tear the graph down. Errors mean it was already gone and are ignored.
    fn release(mut self) {
        let steps = [
            ("stop", self.graph.stop()),
            ("disconnect", self.graph.disconnect()),
            ("close", self.graph.close()),
        ];

        for (step, result) in steps {
            if let Err(e) = result {
                debug!("Keep-alive {} ignored: {}", step, e);
            }
        }
    }
}

/// Owns at most one keep-alive tone
pub struct KeepAliveController {
    output: Box<dyn AudioOutput>,
    spec: ToneSpec,
    active: Option<KeepAliveHandle>,
}

impl KeepAliveController {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self::with_spec(output, ToneSpec::default())
    }

    pub fn with_spec(output: Box<dyn AudioOutput>, spec: ToneSpec) -> Self {
        Self {
            output,
            spec,
            active: None,
        }
    }

    /// Start the tone unless one is already playing. Returns whether a tone is active.
    pub fn start(&mut self) -> bool {
        if self.active.is_some() {
            debug!("Keep-alive already active");
            return true;
        }

        match self.output.open_tone(&self.spec) {
            Ok(graph) => {
                info!("Keep-alive tone started (gain {})", self.spec.gain);
                self.active = Some(KeepAliveHandle { graph });
                true
            }
            Err(e) => {
                warn!("Keep-alive unavailable, continuing without it: {}", e);
                false
            }
        }
    }

    /// Release the tone. Safe when nothing is playing.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.release();
            info!("Keep-alive tone stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for KeepAliveController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Audio output for hosts without an audio device; every open fails
pub struct NoAudioOutput;

impl AudioOutput for NoAudioOutput {
    fn open_tone(&self, _spec: &ToneSpec) -> Result<Box<dyn ToneGraph>, KeepAliveError> {
        Err(KeepAliveError::Unavailable("no audio output".to_string()))
    }
}
