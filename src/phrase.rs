/// Wake/stop phrase model and transcript matching
///
/// Matching is plain substring containment, tested in configured order.
/// Stop phrases are always checked first; a stop hit suppresses wake
/// matching for the same transcript.

use crate::error::EarError;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A configured trigger phrase bound to the language it should be heard in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub word: String,
    pub language: String,
}

impl Phrase {
    /// Create a phrase, trimming the word. Fails if nothing is left.
    pub fn new(word: &str, language: &str) -> Result<Self, EarError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(EarError::InvalidPhrase(
                "phrase word must not be empty".to_string(),
            ));
        }

        Ok(Self {
            word: word.to_string(),
            language: language.to_string(),
        })
    }
}

/// Caller-facing phrase form: a bare string (default language) or a full phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhraseInput {
    Word(String),
    Phrase { word: String, language: String },
}

impl PhraseInput {
    /// Resolve into a `Phrase`, filling in `default_language` for bare strings
    pub fn resolve(&self, default_language: &str) -> Result<Phrase, EarError> {
        match self {
            PhraseInput::Word(word) => Phrase::new(word, default_language),
            PhraseInput::Phrase { word, language } => Phrase::new(word, language),
        }
    }
}

impl From<&str> for PhraseInput {
    fn from(word: &str) -> Self {
        PhraseInput::Word(word.to_string())
    }
}

impl From<(&str, &str)> for PhraseInput {
    fn from((word, language): (&str, &str)) -> Self {
        PhraseInput::Phrase {
            word: word.to_string(),
            language: language.to_string(),
        }
    }
}

/// Resolved wake and stop phrases, in configured order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseSet {
    pub wake: Vec<Phrase>,
    pub stop: Vec<Phrase>,
}

impl PhraseSet {
    pub fn resolve(
        wake: &[PhraseInput],
        stop: &[PhraseInput],
        default_language: &str,
    ) -> Result<Self, EarError> {
        let wake = wake
            .iter()
            .map(|p| p.resolve(default_language))
            .collect::<Result<Vec<_>, _>>()?;
        let stop = stop
            .iter()
            .map(|p| p.resolve(default_language))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { wake, stop })
    }

    /// Languages of all wake phrases followed by all stop phrases
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.wake
            .iter()
            .chain(self.stop.iter())
            .map(|p| p.language.as_str())
    }
}

/// A phrase heard inside a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub phrase: Phrase,
    pub transcript: String,
}

/// Result of matching one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Stop(Detection),
    Wake(Detection),
    Nothing,
}

/// Matches transcripts against a frozen phrase set
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: PhraseSet,
    case_sensitive: bool,
}

impl PhraseMatcher {
    pub fn new(phrases: PhraseSet, case_sensitive: bool) -> Self {
        Self {
            phrases,
            case_sensitive,
        }
    }

    pub fn phrases(&self) -> &PhraseSet {
        &self.phrases
    }

    /// First stop phrase contained in `text`, if any
    pub fn match_stop(&self, text: &str) -> Option<&Phrase> {
        self.first_match(&self.phrases.stop, text)
    }

    /// First wake phrase contained in `text`, if any
    pub fn match_wake(&self, text: &str) -> Option<&Phrase> {
        self.first_match(&self.phrases.wake, text)
    }

    /// Classify a transcript. Stop wins over wake.
    pub fn classify(&self, text: &str) -> MatchOutcome {
        if let Some(phrase) = self.match_stop(text) {
            return MatchOutcome::Stop(Detection {
                phrase: phrase.clone(),
                transcript: text.to_string(),
            });
        }

        match self.match_wake(text) {
            Some(phrase) => MatchOutcome::Wake(Detection {
                phrase: phrase.clone(),
                transcript: text.to_string(),
            }),
            None => MatchOutcome::Nothing,
        }
    }

    fn first_match<'a>(&self, candidates: &'a [Phrase], text: &str) -> Option<&'a Phrase> {
        let haystack = self.fold(text);

        let hit = candidates
            .iter()
            .find(|p| haystack.contains(self.fold(&p.word).as_str()));

        if let Some(phrase) = hit {
            trace!("Matched {:?} in {:?}", phrase.word, text);
        }
        hit
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(wake: &[&str], stop: &[&str], case_sensitive: bool) -> PhraseMatcher {
        let wake: Vec<PhraseInput> = wake.iter().map(|w| PhraseInput::from(*w)).collect();
        let stop: Vec<PhraseInput> = stop.iter().map(|w| PhraseInput::from(*w)).collect();
        PhraseMatcher::new(PhraseSet::resolve(&wake, &stop, "en-US").unwrap(), case_sensitive)
    }

    #[test]
    fn test_wake_substring_match() {
        let m = matcher(&["hey"], &[], false);

        match m.classify("well hey there") {
            MatchOutcome::Wake(d) => {
                assert_eq!(d.phrase.word, "hey");
                assert_eq!(d.transcript, "well hey there");
            }
            other => panic!("Expected wake, got {:?}", other),
        }
    }

    #[test]
    fn test_substring_not_word_boundary() {
        let m = matcher(&["hey"], &[], false);
        assert!(m.match_wake("theyre here").is_some());
    }

    #[test]
    fn test_stop_suppresses_wake() {
        let m = matcher(&["hey"], &["stop"], false);

        match m.classify("hey please stop now") {
            MatchOutcome::Stop(d) => assert_eq!(d.phrase.word, "stop"),
            other => panic!("Expected stop, got {:?}", other),
        }
    }

    #[test]
    fn test_first_configured_phrase_wins() {
        let m = matcher(&["hello world", "hello"], &[], false);
        assert_eq!(m.match_wake("hello world").unwrap().word, "hello world");

        let m = matcher(&["hello", "hello world"], &[], false);
        assert_eq!(m.match_wake("hello world").unwrap().word, "hello");
    }

    #[test]
    fn test_case_policy() {
        let insensitive = matcher(&["Hey Aether"], &[], false);
        assert!(insensitive.match_wake("HEY AETHER, lights").is_some());

        let sensitive = matcher(&["Hey Aether"], &[], true);
        assert!(sensitive.match_wake("hey aether").is_none());
        assert!(sensitive.match_wake("Hey Aether").is_some());
    }

    #[test]
    fn test_duplicates_tolerated() {
        let m = matcher(&["hey", "hey"], &[], false);
        assert!(m.match_wake("hey").is_some());
    }

    #[test]
    fn test_phrase_rejects_blank_word() {
        assert!(Phrase::new("   ", "en-US").is_err());
        assert_eq!(Phrase::new("  hey ", "en-US").unwrap().word, "hey");
    }

    #[test]
    fn test_phrase_input_deserializes_both_forms() {
        let inputs: Vec<PhraseInput> =
            serde_json::from_str(r#"["hey", {"word": "もしもし", "language": "ja-JP"}]"#).unwrap();

        let set = PhraseSet::resolve(&inputs, &[], "en-US").unwrap();
        assert_eq!(set.wake[0].language, "en-US");
        assert_eq!(set.wake[1].language, "ja-JP");
    }
}
