//! Word lists used to build synthetic names.
//!
//! Loaded once per run and never modified. A missing file, an unreadable file,
//! a blank line or an empty list are all configuration errors.

use std::fs;
use std::path::PathBuf;

use crate::interface::{AnonymizerError, WordListSource};

pub const ADJECTIVES: &str = "adjectives";
pub const NOUNS: &str = "nouns";

/// Reads `<dir>/<name>.txt`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl WordListSource for DirectorySource {
    fn load(&self, name: &str) -> Result<Vec<String>, AnonymizerError> {
        let path = self.dir.join(format!("{}.txt", name));
        let raw = fs::read_to_string(&path).map_err(|e| AnonymizerError::WordList {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        parse_words(name, &raw)
    }
}

/// Lists compiled into the binary from the `word-data` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSource;

impl WordListSource for BundledSource {
    fn load(&self, name: &str) -> Result<Vec<String>, AnonymizerError> {
        let words = word_data::by_name(name).ok_or_else(|| AnonymizerError::WordList {
            name: name.to_string(),
            reason: "no bundled list with that name".to_string(),
        })?;
        if words.is_empty() {
            return Err(AnonymizerError::WordList {
                name: name.to_string(),
                reason: "list is empty".to_string(),
            });
        }
        Ok(words.iter().map(|w| w.to_string()).collect())
    }
}

/// Split a word file into lines, rejecting blank lines and empty files.
pub fn parse_words(name: &str, raw: &str) -> Result<Vec<String>, AnonymizerError> {
    let mut words = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let word = line.trim_end_matches('\r').trim();
        if word.is_empty() {
            return Err(AnonymizerError::WordList {
                name: name.to_string(),
                reason: format!("blank line at line {}", line_no + 1),
            });
        }
        words.push(word.to_string());
    }
    if words.is_empty() {
        return Err(AnonymizerError::WordList {
            name: name.to_string(),
            reason: "list is empty".to_string(),
        });
    }
    Ok(words)
}

/// Adjectives (first names) and nouns (last names)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordLists {
    pub adjectives: Vec<String>,
    pub nouns: Vec<String>,
}

impl WordLists {
    pub fn load(source: &dyn WordListSource) -> Result<Self, AnonymizerError> {
        let adjectives = source.load(ADJECTIVES)?;
        let nouns = source.load(NOUNS)?;
        tracing::debug!(adjectives = adjectives.len(), nouns = nouns.len(), "loaded word lists");
        Ok(Self { adjectives, nouns })
    }

    /// Build from in-memory slices; both must be non-empty.
    pub fn from_slices(adjectives: &[&str], nouns: &[&str]) -> Result<Self, AnonymizerError> {
        let adjectives = parse_words(ADJECTIVES, &adjectives.join("\n"))?;
        let nouns = parse_words(NOUNS, &nouns.join("\n"))?;
        Ok(Self { adjectives, nouns })
    }
}
