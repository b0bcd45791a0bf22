/// Round-robin language rotation across recognition session restarts

use tracing::debug;

/// Ordered, deduplicated language tags plus the current position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRotator {
    languages: Vec<String>,
    index: usize,
}

impl LanguageRotator {
    /// Build from languages in first-seen order. Empty input falls back to
    /// a single-element rotation of `default_language`.
    pub fn new<'a, I>(languages: I, default_language: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for lang in languages {
            if !unique.iter().any(|l| l == lang) {
                unique.push(lang.to_string());
            }
        }

        if unique.is_empty() {
            unique.push(default_language.to_string());
        }

        debug!("Language rotation: {:?}", unique);

        Self {
            languages: unique,
            index: 0,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn current(&self) -> &str {
        &self.languages[self.index]
    }

    /// Move to the next language, wrapping around, and return it
    pub fn advance(&mut self) -> &str {
        self.index = (self.index + 1) % self.languages.len();
        &self.languages[self.index]
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}
