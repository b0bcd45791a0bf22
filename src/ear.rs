/// Listener facade
///
/// `Ear` ties the session state machine to the platform capabilities and
/// the keep-alive / wake-lock controllers. Every platform callback, timer
/// and caller command is funnelled through one event queue and handled on
/// the task that owns the `Ear`, one event at a time.
///
/// Restart delays run as tokio timers. An `Ear` built inside a tokio runtime
/// keeps using that runtime for them even when later polled from elsewhere.
/// Dropping an `Ear` stops the live session, the keep-alive tone and any
/// held wake lock; prefer `stop().await` for an orderly shutdown.

use crate::config::EarConfig;
use crate::error::EarError;
use crate::keepalive::{AudioOutput, KeepAliveController};
use crate::phrase::{Detection, PhraseMatcher};
use crate::recognition::{
    RecognitionBackend, RecognitionSession, SessionEvent, SessionEventSink, SessionId,
    SessionOptions,
};
use crate::rotation::LanguageRotator;
use crate::session::{Activity, Effect, Input, SessionManager, SessionState};
use crate::wakelock::{ScreenWakeLock, Visibility, WakeLockController};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything the listener reacts to
#[derive(Debug)]
pub enum EarEvent {
    Start,
    Stop,
    Session { id: SessionId, event: SessionEvent },
    Visibility(Visibility),
    RestartDue(u64),
    Reconfigure(EarConfig),
    Shutdown,
}

pub type DetectionCallback = Box<dyn FnMut(&Detection) + Send>;

/// Caller callbacks, read when a detection fires
pub struct EarCallbacks {
    pub on_wake: DetectionCallback,
    pub on_stop: Option<DetectionCallback>,
}

impl EarCallbacks {
    pub fn new(on_wake: impl FnMut(&Detection) + Send + 'static) -> Self {
        Self {
            on_wake: Box::new(on_wake),
            on_stop: None,
        }
    }

    pub fn on_stop(mut self, on_stop: impl FnMut(&Detection) + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

/// Platform capabilities the listener runs on
pub struct Capabilities {
    pub recognition: Box<dyn RecognitionBackend>,
    pub audio: Box<dyn AudioOutput>,
    pub wake_lock: Box<dyn ScreenWakeLock>,
}

/// Cloneable sender for commands into a running `Ear`
#[derive(Debug, Clone)]
pub struct EarHandle {
    tx: mpsc::UnboundedSender<EarEvent>,
}

impl EarHandle {
    /// Queue an event. Returns false once the listener is gone.
    pub fn send(&self, event: EarEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn start(&self) -> bool {
        self.send(EarEvent::Start)
    }

    pub fn stop(&self) -> bool {
        self.send(EarEvent::Stop)
    }

    pub fn visibility(&self, visibility: Visibility) -> bool {
        self.send(EarEvent::Visibility(visibility))
    }

    pub fn reconfigure(&self, config: EarConfig) -> bool {
        self.send(EarEvent::Reconfigure(config))
    }

    pub fn shutdown(&self) -> bool {
        self.send(EarEvent::Shutdown)
    }
}

/// Wake/stop phrase listener
pub struct Ear {
    config: EarConfig,
    callbacks: EarCallbacks,
    recognition: Box<dyn RecognitionBackend>,
    keep_alive: KeepAliveController,
    wake_lock: WakeLockController,
    manager: SessionManager,
    live: Option<(SessionId, Box<dyn RecognitionSession>)>,
    supported: Option<bool>,
    runtime: Option<Handle>,
    events_tx: mpsc::UnboundedSender<EarEvent>,
    events_rx: mpsc::UnboundedReceiver<EarEvent>,
}

impl Ear {
    pub fn new(config: EarConfig, callbacks: EarCallbacks, capabilities: Capabilities) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "Initializing listener: {} wake / {} stop phrases",
            config.wake_words.len(),
            config.stop_words.len()
        );

        Self {
            config,
            callbacks,
            recognition: capabilities.recognition,
            keep_alive: KeepAliveController::new(capabilities.audio),
            wake_lock: WakeLockController::new(capabilities.wake_lock),
            manager: SessionManager::new(),
            live: None,
            supported: None,
            runtime: Handle::try_current().ok(),
            events_tx,
            events_rx,
        }
    }

    pub fn handle(&self) -> EarHandle {
        EarHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Probe the recognition capability. `is_supported` reports false until this runs.
    pub fn probe(&mut self) -> bool {
        let supported = self.recognition.is_available();
        info!("Speech recognition supported: {}", supported);
        self.supported = Some(supported);
        supported
    }

    pub fn is_supported(&self) -> bool {
        self.supported.unwrap_or(false)
    }

    pub fn is_listening(&self) -> bool {
        self.manager.is_listening()
    }

    pub fn error(&self) -> Option<&EarError> {
        self.manager.error()
    }

    pub fn transcript(&self) -> &str {
        self.manager.transcript()
    }

    pub fn state(&self) -> &SessionState {
        self.manager.state()
    }

    pub fn config(&self) -> &EarConfig {
        &self.config
    }

    pub fn keep_alive_active(&self) -> bool {
        self.keep_alive.is_active()
    }

    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock.is_held()
    }

    /// Replace the configuration. Phrases and languages apply from the next `start`.
    pub fn reconfigure(&mut self, config: EarConfig) {
        debug!("Configuration updated");
        self.config = config;
    }

    /// Replace the callbacks. Takes effect for the next detection.
    pub fn set_callbacks(&mut self, callbacks: EarCallbacks) {
        self.callbacks = callbacks;
    }

    /// Begin a listening activity, superseding any current one
    pub async fn start(&mut self) -> Result<(), EarError> {
        if !self.recognition.is_available() {
            self.manager.fail(EarError::CapabilityUnavailable);
            return Err(EarError::CapabilityUnavailable);
        }

        let activity = match self.activity() {
            Ok(activity) => activity,
            Err(e) => {
                self.manager.fail(e.clone());
                return Err(e);
            }
        };

        if self.config.keep_alive {
            self.keep_alive.start();
        }
        if self.config.screen_lock {
            self.wake_lock.acquire().await;
        }

        let effects = self.manager.step(Input::Start(activity));
        self.apply(effects).await;
        Ok(())
    }

    /// End the listening activity. Safe to call in any state.
    pub async fn stop(&mut self) {
        let effects = self.manager.step(Input::Stop);
        self.apply(effects).await;
    }

    /// Handle one event. Returns false on shutdown.
    pub async fn dispatch(&mut self, event: EarEvent) -> bool {
        match event {
            EarEvent::Start => {
                if let Err(e) = self.start().await {
                    warn!("Start refused: {}", e);
                }
            }
            EarEvent::Stop => self.stop().await,
            EarEvent::Session { id, event } => {
                let effects = self.manager.step(Input::Session { id, event });
                self.apply(effects).await;
            }
            EarEvent::Visibility(visibility) => {
                debug!("Visibility changed: {:?}", visibility);
                self.wake_lock.on_visibility(visibility).await;
            }
            EarEvent::RestartDue(ticket) => {
                let effects = self.manager.step(Input::RestartDue { ticket });
                self.apply(effects).await;
            }
            EarEvent::Reconfigure(config) => self.reconfigure(config),
            EarEvent::Shutdown => {
                info!("Listener shutting down");
                self.stop().await;
                return false;
            }
        }
        true
    }

    /// Wait for the next queued event and handle it. Returns false on shutdown.
    pub async fn pump(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.dispatch(event).await,
            None => false,
        }
    }

    /// Handle every event queued so far without waiting
    pub async fn drain(&mut self) -> bool {
        while let Ok(event) = self.events_rx.try_recv() {
            if !self.dispatch(event).await {
                return false;
            }
        }
        true
    }

    /// Probe capabilities, then handle events until shutdown
    pub async fn run(mut self) {
        self.probe();
        while self.pump().await {}
    }

    fn activity(&self) -> Result<Activity, EarError> {
        let phrases = self.config.phrases()?;
        if phrases.wake.is_empty() {
            debug!("No wake phrases configured, listening for stop phrases only");
        }

        let rotation = LanguageRotator::new(phrases.languages(), &self.config.language);

        Ok(Activity {
            matcher: PhraseMatcher::new(phrases, self.config.case_sensitive),
            rotation,
            continuous: self.config.continuous,
            restart_delay: self.config.restart_delay(),
        })
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenSession { id, options } => {
                    if let Err(reason) = self.open_session(id, &options) {
                        queue.extend(self.manager.step(Input::OpenFailed { id, reason }));
                    }
                }
                Effect::CloseSession { id } => self.close_session(id),
                Effect::ScheduleRestart { ticket, delay } => self.schedule_restart(ticket, delay),
                Effect::Wake(detection) => (self.callbacks.on_wake)(&detection),
                Effect::Stop(detection) => {
                    if let Some(on_stop) = self.callbacks.on_stop.as_mut() {
                        on_stop(&detection);
                    }
                }
                Effect::ReleaseSideEffects => {
                    self.keep_alive.stop();
                    self.wake_lock.release().await;
                    queue.extend(self.manager.step(Input::Released));
                }
            }
        }
    }

    fn open_session(&mut self, id: SessionId, options: &SessionOptions) -> Result<(), String> {
        // Never two live engines
        if let Some((old_id, mut old)) = self.live.take() {
            debug!("Stopping session {} before opening {}", old_id, id);
            old.stop();
        }

        let sink = SessionEventSink::new(id, self.events_tx.clone());
        let mut session = self
            .recognition
            .open(options, sink)
            .map_err(|e| e.to_string())?;

        if let Err(e) = session.start() {
            session.abort();
            return Err(e.to_string());
        }

        info!("Session {} opened ({})", id, options.language);
        self.live = Some((id, session));
        Ok(())
    }

    fn close_session(&mut self, id: SessionId) {
        match self.live.take() {
            Some((live_id, mut session)) => {
                if live_id != id {
                    warn!("Closing session {} while asked to close {}", live_id, id);
                }
                session.stop();
                debug!("Session {} closed", live_id);
            }
            None => debug!("Session {} already gone", id),
        }
    }

    fn schedule_restart(&self, ticket: u64, delay: Duration) {
        let runtime = Handle::try_current().ok().or_else(|| self.runtime.clone());
        spawn_restart_timer(runtime.as_ref(), self.events_tx.clone(), ticket, delay);
    }
}

/// Post `RestartDue(ticket)` after `delay`, on a plain thread when no runtime is reachable
fn spawn_restart_timer(
    runtime: Option<&Handle>,
    tx: mpsc::UnboundedSender<EarEvent>,
    ticket: u64,
    delay: Duration,
) {
    match runtime {
        Some(runtime) => {
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(EarEvent::RestartDue(ticket));
            });
        }
        None => {
            debug!("No tokio runtime, restart {} timed on a thread", ticket);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                let _ = tx.send(EarEvent::RestartDue(ticket));
            });
        }
    }
}

impl Drop for Ear {
    fn drop(&mut self) {
        if let Some((_, mut session)) = self.live.take() {
            session.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_timer_without_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        spawn_restart_timer(None, tx, 7, Duration::from_millis(5));

        assert!(matches!(rx.blocking_recv(), Some(EarEvent::RestartDue(7))));
    }

    #[test]
    fn test_restart_timer_on_captured_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Called from a plain thread holding only the handle
        spawn_restart_timer(Some(runtime.handle()), tx, 3, Duration::from_millis(5));

        assert!(matches!(rx.blocking_recv(), Some(EarEvent::RestartDue(3))));
    }
}
