//! # Sign Vocabulary
//!
//! Maps model output ordinals to human-readable sign labels. Loaded once at startup
//! from the same JSON file the web client uses for its word list:
//!
//! ```json
//! {"0": {"sign": "TV"}, "1": {"sign": "after"}}
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct VocabularyEntry {
    sign: String,
}

/// Immutable ordinal → sign lookup.
#[derive(Debug, Clone, Default)]
pub struct SignVocabulary {
    signs: BTreeMap<usize, String>,
}

impl SignVocabulary {
    pub fn new(signs: BTreeMap<usize, String>) -> Self {
        Self { signs }
    }

    /// Parse the vocabulary map. Keys must be non-negative integers.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, VocabularyEntry> =
            serde_json::from_str(json).context("Invalid vocabulary JSON")?;

        let mut signs = BTreeMap::new();
        for (key, entry) in raw {
            let ordinal: usize = key
                .trim()
                .parse()
                .map_err(|_| anyhow!("Vocabulary key '{}' is not an ordinal", key))?;
            signs.insert(ordinal, entry.sign);
        }

        if signs.is_empty() {
            return Err(anyhow!("Vocabulary is empty"));
        }

        Ok(Self::new(signs))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary {}", path.display()))?;
        let vocabulary = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), signs = vocabulary.len(), "Sign vocabulary loaded");
        Ok(vocabulary)
    }

    pub fn sign(&self, ordinal: usize) -> Option<&str> {
        self.signs.get(&ordinal).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    /// Highest ordinal present.
    pub fn max_ordinal(&self) -> Option<usize> {
        self.signs.keys().next_back().copied()
    }
}

impl FromIterator<(usize, String)> for SignVocabulary {
    fn from_iter<I: IntoIterator<Item = (usize, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
