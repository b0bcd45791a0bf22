/// Console listener binary
///
/// Stands in for a live recognizer: every stdin line is delivered as a
/// recognition result, an empty line ends the current session (which
/// rotates to the next language), and EOF shuts down.

use anyhow::Context;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wake_ear::{
    Capabilities, Ear, EarCallbacks, EarConfig, NoAudioOutput, NoScreenWakeLock,
    PhraseInput, RecognitionBackend, RecognitionError, RecognitionResults, RecognitionSession,
    SessionEventSink, SessionOptions,
};

type CurrentSink = Arc<Mutex<Option<SessionEventSink>>>;

/// Routes console input to whichever session is currently open
struct ConsoleRecognition {
    current: CurrentSink,
}

struct ConsoleSession {
    events: SessionEventSink,
    current: CurrentSink,
}

impl RecognitionBackend for ConsoleRecognition {
    fn is_available(&self) -> bool {
        true
    }

    fn open(
        &self,
        options: &SessionOptions,
        events: SessionEventSink,
    ) -> Result<Box<dyn RecognitionSession>, RecognitionError> {
        info!("Type a transcript ({}), empty line to end the session", options.language);
        Ok(Box::new(ConsoleSession {
            events,
            current: self.current.clone(),
        }))
    }
}

impl RecognitionSession for ConsoleSession {
    fn start(&mut self) -> Result<(), RecognitionError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| RecognitionError::Start("console state poisoned".to_string()))?;
        *current = Some(self.events.clone());
        self.events.started();
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().map(|s| s.id()) == Some(self.events.id()) {
                *current = None;
            }
        }
    }

    fn abort(&mut self) {
        self.stop();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wake_ear::init_logging();

    info!("Starting wake-ear console listener v{}", wake_ear::VERSION);

    let config = load_config()?;
    let current: CurrentSink = Arc::new(Mutex::new(None));

    let capabilities = Capabilities {
        recognition: Box::new(ConsoleRecognition {
            current: current.clone(),
        }),
        audio: Box::new(NoAudioOutput),
        wake_lock: Box::new(NoScreenWakeLock),
    };

    let mut ear = Ear::new(config, EarCallbacks::new(|_| {}), capabilities);
    let handle = ear.handle();

    let stop_handle = handle.clone();
    ear.set_callbacks(
        EarCallbacks::new(|d| {
            info!("Wake phrase {:?} heard in {:?}", d.phrase.word, d.transcript);
        })
        .on_stop(move |d| {
            info!("Stop phrase {:?} heard, shutting down", d.phrase.word);
            stop_handle.shutdown();
        }),
    );

    if !ear.probe() {
        anyhow::bail!("speech recognition unavailable");
    }
    ear.start().await.context("failed to start listening")?;

    let mut listener = tokio::spawn(ear.run());
    let stdin = BufReader::new(tokio::io::stdin());

    if !relay(stdin, &current, &mut listener).await? {
        handle.shutdown();
        listener.await?;
    }

    info!("Console listener stopped");
    Ok(())
}

/// Feed input lines to the open session until EOF or the listener exits.
/// Returns whether the listener already finished.
async fn relay<R>(input: R, current: &CurrentSink, listener: &mut JoinHandle<()>) -> anyhow::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            joined = &mut *listener => {
                joined?;
                return Ok(true);
            }
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => return Ok(false),
            },
        };

        let sink = current.lock().ok().and_then(|c| c.clone());
        let Some(sink) = sink else {
            warn!("No open session, input dropped");
            continue;
        };

        let line = line.trim();
        let delivered = if line.is_empty() {
            sink.ended()
        } else {
            sink.result(RecognitionResults::from_transcript(line, true))
        };

        if !delivered {
            return Ok(false);
        }
    }
}

/// Load configuration from `EAR_CONFIG` (JSON file) or defaults, then apply env overrides
fn load_config() -> anyhow::Result<EarConfig> {
    let config = match std::env::var("EAR_CONFIG") {
        Ok(path) => EarConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => {
            warn!("EAR_CONFIG not set, using demo phrases");
            EarConfig::new([PhraseInput::from(("hey aether", "en-US")), PhraseInput::from("ねえ")])
                .with_stop_words(["stop listening"])
        }
    };

    Ok(config.apply_env()?)
}
