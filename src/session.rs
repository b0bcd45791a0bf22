/// Recognition session manager
///
/// Explicit state machine for one listening activity. `step` takes an input
/// and returns the effects the owner must carry out; it never touches the
/// platform itself, so it can be driven entirely from tests.
///
/// ```text
/// Idle -> Starting -> Listening -> Stopping -> Idle
///            ^            |
///            +--- end ----+   (rotate language, delayed reopen)
/// ```

use crate::error::EarError;
use crate::phrase::{Detection, MatchOutcome, PhraseMatcher};
use crate::recognition::{SessionEvent, SessionId, SessionOptions};
use crate::rotation::LanguageRotator;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Delay before reopening after a natural session end
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session open
    Idle,

    /// Session requested; `session` is None while a restart delay is pending
    Starting {
        session: Option<SessionId>,
        language: String,
    },

    /// Engine confirmed it is hearing audio
    Listening { session: SessionId, language: String },

    /// Teardown in progress
    Stopping,
}

/// Everything frozen for the duration of one listening activity
#[derive(Debug, Clone)]
pub struct Activity {
    pub matcher: PhraseMatcher,
    pub rotation: LanguageRotator,
    pub continuous: bool,
    pub restart_delay: Duration,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum Input {
    /// Begin (or supersede) a listening activity
    Start(Activity),

    /// Tear the activity down
    Stop,

    /// Engine callback for a session
    Session { id: SessionId, event: SessionEvent },

    /// The owner could not construct or begin the session
    OpenFailed { id: SessionId, reason: String },

    /// A scheduled restart delay elapsed
    RestartDue { ticket: u64 },

    /// Side effects have been released
    Released,
}

/// Work the owner must perform, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenSession { id: SessionId, options: SessionOptions },
    CloseSession { id: SessionId },
    ScheduleRestart { ticket: u64, delay: Duration },
    Wake(Detection),
    Stop(Detection),
    ReleaseSideEffects,
}

pub struct SessionManager {
    state: SessionState,
    activity: Option<Activity>,
    live: Option<SessionId>,
    armed: bool,
    listening: bool,
    next_session: u64,
    next_ticket: u64,
    pending_restart: Option<u64>,
    transcript: String,
    error: Option<EarError>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            activity: None,
            live: None,
            armed: false,
            listening: false,
            next_session: 0,
            next_ticket: 0,
            pending_restart: None,
            transcript: String::new(),
            error: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Caller-visible listening flag; stays set across rotation restarts
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Whether a natural session end should lead to a restart
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn error(&self) -> Option<&EarError> {
        self.error.as_ref()
    }

    pub fn activity(&self) -> Option<&Activity> {
        self.activity.as_ref()
    }

    /// Session that currently owns engine events, if any
    pub fn current_session(&self) -> Option<SessionId> {
        match &self.state {
            SessionState::Starting { session, .. } => *session,
            SessionState::Listening { session, .. } => Some(*session),
            _ => None,
        }
    }

    /// Record a fault raised outside the state machine (e.g. missing capability)
    pub fn fail(&mut self, error: EarError) {
        warn!("{}", error);
        self.error = Some(error);
    }

    /// Apply one input and return the resulting effects
    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        let before = self.state.clone();

        let effects = match input {
            Input::Start(activity) => self.on_start(activity),
            Input::Stop => self.teardown(),
            Input::Session { id, event } => {
                if self.current_session() != Some(id) {
                    trace!("Ignoring stale event from session {}", id);
                    return Vec::new();
                }
                self.on_session_event(id, event)
            }
            Input::OpenFailed { id, reason } => self.on_open_failed(id, reason),
            Input::RestartDue { ticket } => self.on_restart_due(ticket),
            Input::Released => {
                if self.state == SessionState::Stopping {
                    self.state = SessionState::Idle;
                }
                Vec::new()
            }
        };

        if before != self.state {
            debug!("Session state: {:?} -> {:?}", before, self.state);
        }

        effects
    }

    fn on_start(&mut self, mut activity: Activity) -> Vec<Effect> {
        let mut effects = Vec::new();

        activity.rotation.reset();
        let language = activity.rotation.current().to_string();
        info!(
            "Listening activity started, languages: {:?}",
            activity.rotation.languages()
        );

        self.activity = Some(activity);
        self.armed = true;
        self.pending_restart = None;

        // Supersedes whatever is open
        self.open(language, &mut effects);
        effects
    }

    fn on_session_event(&mut self, id: SessionId, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::Start => {
                let language = self.state_language();
                info!("Session {} listening ({})", id, language);
                self.state = SessionState::Listening {
                    session: id,
                    language,
                };
                self.listening = true;
                self.error = None;
                Vec::new()
            }

            SessionEvent::Result(results) => {
                let Some(text) = results.latest_transcript() else {
                    return Vec::new();
                };
                self.transcript = text.to_string();

                let outcome = match &self.activity {
                    Some(activity) => activity.matcher.classify(text),
                    None => MatchOutcome::Nothing,
                };

                match outcome {
                    MatchOutcome::Stop(detection) => {
                        info!("Stop phrase detected: {:?}", detection.phrase.word);
                        let mut effects = vec![Effect::Stop(detection)];
                        effects.extend(self.teardown());
                        effects
                    }
                    MatchOutcome::Wake(detection) => {
                        info!("Wake phrase detected: {:?}", detection.phrase.word);
                        vec![Effect::Wake(detection)]
                    }
                    MatchOutcome::Nothing => Vec::new(),
                }
            }

            SessionEvent::Error { error, message } => {
                let fault = EarError::Session {
                    code: error,
                    message,
                };
                warn!("Session {} failed: {}", id, fault);
                self.error = Some(fault);
                self.listening = false;
                self.state = SessionState::Idle;
                self.live = None;
                vec![Effect::CloseSession { id }]
            }

            SessionEvent::End => self.on_end(id),
        }
    }

    fn on_end(&mut self, id: SessionId) -> Vec<Effect> {
        let continuous = self.activity.as_ref().is_some_and(|a| a.continuous);

        if !(self.armed && continuous) {
            info!("Session {} ended, listening activity finished", id);
            self.armed = false;
            self.listening = false;
            self.state = SessionState::Idle;

            let mut effects = Vec::new();
            if let Some(live) = self.live.take() {
                effects.push(Effect::CloseSession { id: live });
            }
            effects.push(Effect::ReleaseSideEffects);
            return effects;
        }

        let Some(activity) = self.activity.as_mut() else {
            self.state = SessionState::Idle;
            return Vec::new();
        };

        let language = activity.rotation.advance().to_string();
        let delay = activity.restart_delay;

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending_restart = Some(ticket);

        debug!("Session {} ended, restarting in {} after {:?}", id, language, delay);
        self.state = SessionState::Starting {
            session: None,
            language,
        };

        vec![Effect::ScheduleRestart { ticket, delay }]
    }

    fn on_restart_due(&mut self, ticket: u64) -> Vec<Effect> {
        if !self.armed || self.pending_restart != Some(ticket) {
            trace!("Discarding stale restart ticket {}", ticket);
            return Vec::new();
        }
        self.pending_restart = None;

        let language = self.state_language();
        let mut effects = Vec::new();
        self.open(language, &mut effects);
        effects
    }

    fn on_open_failed(&mut self, id: SessionId, reason: String) -> Vec<Effect> {
        if self.current_session() != Some(id) {
            return Vec::new();
        }

        self.fail(EarError::StartFailed(reason));
        self.live = None;
        self.listening = false;
        self.state = SessionState::Idle;
        Vec::new()
    }

    /// Disarm, close the live session and release side effects
    fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(id) = self.live.take() {
            effects.push(Effect::CloseSession { id });
        }
        effects.push(Effect::ReleaseSideEffects);

        if self.armed {
            info!("Listening activity stopped");
        }
        self.armed = false;
        self.pending_restart = None;
        self.listening = false;
        self.state = SessionState::Stopping;

        effects
    }

    /// Close the live handle, if any, then open a session for `language`
    fn open(&mut self, language: String, effects: &mut Vec<Effect>) {
        if let Some(prior) = self.live.take() {
            effects.push(Effect::CloseSession { id: prior });
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let continuous = self.activity.as_ref().map_or(true, |a| a.continuous);

        debug!("Opening session {} ({})", id, language);
        self.state = SessionState::Starting {
            session: Some(id),
            language: language.clone(),
        };
        self.live = Some(id);

        effects.push(Effect::OpenSession {
            id,
            options: SessionOptions {
                language,
                continuous,
                interim_results: true,
            },
        });
    }

    fn state_language(&self) -> String {
        match &self.state {
            SessionState::Starting { language, .. } | SessionState::Listening { language, .. } => {
                language.clone()
            }
            _ => self
                .activity
                .as_ref()
                .map(|a| a.rotation.current().to_string())
                .unwrap_or_default(),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
