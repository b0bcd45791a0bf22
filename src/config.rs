/// Listener configuration
///
/// Loaded from JSON (file or string) with optional environment overrides.

use crate::phrase::{PhraseInput, PhraseSet};
use crate::session::DEFAULT_RESTART_DELAY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Language used for bare-string phrases when none is configured
pub const DEFAULT_LANGUAGE: &str = "ja-JP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value}")]
    Env { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarConfig {
    /// Phrases that fire the wake callback
    pub wake_words: Vec<PhraseInput>,

    /// Phrases that end the listening activity
    #[serde(default)]
    pub stop_words: Vec<PhraseInput>,

    /// Keep restarting sessions (rotating languages) after the engine stops itself
    #[serde(default = "default_true")]
    pub continuous: bool,

    /// Language for bare-string phrases and the fallback rotation
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub case_sensitive: bool,

    /// Play the inaudible keep-alive tone while listening
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Hold a screen wake lock while listening
    #[serde(default)]
    pub screen_lock: bool,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY.as_millis() as u64
}

impl Default for EarConfig {
    fn default() -> Self {
        Self {
            wake_words: Vec::new(),
            stop_words: Vec::new(),
            continuous: true,
            language: default_language(),
            case_sensitive: false,
            keep_alive: true,
            screen_lock: false,
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl EarConfig {
    /// Config with the given wake phrases and defaults for everything else
    pub fn new<I, P>(wake_words: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PhraseInput>,
    {
        Self {
            wake_words: wake_words.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_stop_words<I, P>(mut self, stop_words: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PhraseInput>,
    {
        self.stop_words = stop_words.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Overlay `EAR_*` environment variables
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(language) = std::env::var("EAR_LANGUAGE") {
            self.language = language;
        }
        if let Some(v) = env_flag("EAR_CONTINUOUS")? {
            self.continuous = v;
        }
        if let Some(v) = env_flag("EAR_CASE_SENSITIVE")? {
            self.case_sensitive = v;
        }
        if let Some(v) = env_flag("EAR_KEEP_ALIVE")? {
            self.keep_alive = v;
        }
        if let Some(v) = env_flag("EAR_SCREEN_LOCK")? {
            self.screen_lock = v;
        }
        if let Ok(value) = std::env::var("EAR_RESTART_DELAY_MS") {
            self.restart_delay_ms = value.parse().map_err(|_| ConfigError::Env {
                var: "EAR_RESTART_DELAY_MS".to_string(),
                value,
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "language must not be empty".to_string(),
            ));
        }

        self.phrases()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    /// Resolve wake and stop phrases against the default language
    pub fn phrases(&self) -> Result<PhraseSet, crate::error::EarError> {
        PhraseSet::resolve(&self.wake_words, &self.stop_words, &self.language)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

fn env_flag(var: &str) -> Result<Option<bool>, ConfigError> {
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };

    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: EarConfig = serde_json::from_str(r#"{"wake_words": ["hey"]}"#).unwrap();

        assert!(config.continuous);
        assert!(config.keep_alive);
        assert!(!config.screen_lock);
        assert!(!config.case_sensitive);
        assert_eq!(config.language, "ja-JP");
        assert!(config.stop_words.is_empty());
        assert_eq!(config.restart_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_wake_words_required() {
        assert!(matches!(
            EarConfig::from_json_str(r#"{"stop_words": ["stop"]}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_blank_phrase_rejected() {
        assert!(matches!(
            EarConfig::from_json_str(r#"{"wake_words": ["  "]}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_blank_language_rejected() {
        let mut config = EarConfig::new(["hey"]);
        config.language = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "wake_words": ["hey", {{"word": "おはよう", "language": "ja-JP"}}],
                "stop_words": ["stop"],
                "language": "en-US",
                "screen_lock": true
            }}"#
        )
        .unwrap();

        let config = EarConfig::from_file(file.path()).unwrap();
        let phrases = config.phrases().unwrap();

        assert!(config.screen_lock);
        assert_eq!(phrases.wake[0].language, "en-US");
        assert_eq!(phrases.wake[1].language, "ja-JP");
        assert_eq!(phrases.stop[0].word, "stop");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EarConfig::from_file("/nonexistent/ear.json"),
            Err(ConfigError::Io(_))
        ));
    }

    const ENV_VARS: [&str; 6] = [
        "EAR_LANGUAGE",
        "EAR_CONTINUOUS",
        "EAR_CASE_SENSITIVE",
        "EAR_KEEP_ALIVE",
        "EAR_SCREEN_LOCK",
        "EAR_RESTART_DELAY_MS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    // Only test touching the EAR_* variables, so nothing races on them
    #[test]
    fn test_env_overlay() {
        clear_env();

        std::env::set_var("EAR_LANGUAGE", "en-US");
        std::env::set_var("EAR_CONTINUOUS", "off");
        std::env::set_var("EAR_CASE_SENSITIVE", "Yes");
        std::env::set_var("EAR_KEEP_ALIVE", "0");
        std::env::set_var("EAR_SCREEN_LOCK", "TRUE");
        std::env::set_var("EAR_RESTART_DELAY_MS", "250");
        let config = EarConfig::new(["hey"]).apply_env();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.language, "en-US");
        assert!(!config.continuous);
        assert!(config.case_sensitive);
        assert!(!config.keep_alive);
        assert!(config.screen_lock);
        assert_eq!(config.restart_delay(), Duration::from_millis(250));
        assert_eq!(config.phrases().unwrap().wake[0].language, "en-US");

        // Unset variables leave the config alone
        let untouched = EarConfig::new(["hey"]).apply_env().unwrap();
        assert_eq!(untouched, EarConfig::new(["hey"]));

        std::env::set_var("EAR_KEEP_ALIVE", "maybe");
        let bad_flag = EarConfig::new(["hey"]).apply_env();
        clear_env();
        assert!(matches!(
            bad_flag,
            Err(ConfigError::Env { var, value }) if var == "EAR_KEEP_ALIVE" && value == "maybe"
        ));

        std::env::set_var("EAR_RESTART_DELAY_MS", "abc");
        let bad_delay = EarConfig::new(["hey"]).apply_env();
        clear_env();
        assert!(matches!(
            bad_delay,
            Err(ConfigError::Env { var, .. }) if var == "EAR_RESTART_DELAY_MS"
        ));

        std::env::set_var("EAR_LANGUAGE", "  ");
        let blank = EarConfig::new(["hey"]).apply_env();
        clear_env();
        assert!(matches!(blank, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_invalid_flag() {
        let var = "EAR_TEST_FLAG_SPELLINGS";

        for (value, expected) in [("1", true), ("on", true), ("no", false), ("False", false)] {
            std::env::set_var(var, value);
            assert_eq!(env_flag(var).unwrap(), Some(expected), "{}", value);
        }

        std::env::set_var(var, "2");
        assert!(matches!(env_flag(var), Err(ConfigError::Env { .. })));

        std::env::remove_var(var);
        assert_eq!(env_flag(var).unwrap(), None);
    }

    #[test]
    fn test_builder() {
        let config = EarConfig::new(["hey"]).with_stop_words([("stop", "en-US")]);
        assert_eq!(config.wake_words, vec![PhraseInput::from("hey")]);
        assert_eq!(config.stop_words.len(), 1);
    }
}
