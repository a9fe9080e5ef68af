//! The immutable corpus of texts and phrases a session drills through.
//!
//! Loading the corpus from a data file is the host's business; this module
//! only parses the JSON shape and answers lookups by phrase id.

use crate::common::{PhraseId, TextId, TextNumber};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to parse corpus: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Corpus {id} contains no texts")]
    Empty { id: String },

    #[error("Text {text} contains no phrases")]
    EmptyText { text: TextId },

    #[error("Text id {text} appears more than once")]
    DuplicateText { text: TextId },
}

/// A highlighted sub-span of a phrase with its own translation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticUnit {
    pub target: String,
    #[serde(default)]
    pub translations: Vec<String>,
}

/// The smallest gradable unit: one full target-language sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phrase {
    pub id: PhraseId,
    pub target: String,
    pub semantic_units: Vec<SemanticUnit>,
    pub primary_translation: String,
    pub distractors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub id: TextId,
    pub phrases: Vec<PhraseId>,
}

// --- On-disk shape ---

#[derive(Deserialize)]
struct CorpusFile {
    id: String,
    texts: Vec<TextFile>,
}

#[derive(Deserialize)]
struct TextFile {
    id: TextId,
    phrases: Vec<PhraseFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhraseFile {
    target: String,
    #[serde(default)]
    semantic_units: Vec<SemanticUnit>,
    primary_translation: String,
    #[serde(default)]
    distractors: Vec<String>,
}

/// An ordered list of texts plus a phrase lookup table.
#[derive(Debug, Clone)]
pub struct Corpus {
    id: String,
    texts: Vec<Text>,
    phrases: HashMap<PhraseId, Phrase>,
}

impl Corpus {
    /// Parses a corpus document, deriving `<textId>_p<n>` phrase ids.
    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        let file: CorpusFile = serde_json::from_str(json)?;
        if file.texts.is_empty() {
            return Err(CorpusError::Empty { id: file.id });
        }

        let mut seen = HashSet::new();
        let mut texts = Vec::with_capacity(file.texts.len());
        let mut phrases = HashMap::new();
        for text in file.texts {
            if text.phrases.is_empty() {
                return Err(CorpusError::EmptyText { text: text.id });
            }
            if !seen.insert(text.id.clone()) {
                return Err(CorpusError::DuplicateText { text: text.id });
            }
            let mut ids = Vec::with_capacity(text.phrases.len());
            for (index, raw) in text.phrases.into_iter().enumerate() {
                let id = PhraseId::derive(&text.id, index + 1);
                ids.push(id.clone());
                phrases.insert(
                    id.clone(),
                    Phrase {
                        id,
                        target: raw.target,
                        semantic_units: raw.semantic_units,
                        primary_translation: raw.primary_translation,
                        distractors: raw.distractors,
                    },
                );
            }
            texts.push(Text { id: text.id, phrases: ids });
        }

        Ok(Self {
            id: file.id,
            texts,
            phrases,
        })
    }

    /// Builds a placeholder corpus with the given per-text phrase counts.
    ///
    /// Texts are named `t1..tn`; every phrase gets two semantic units and
    /// three distractors. Used by the shell's `plan` command and in tests.
    pub fn synthetic(id: &str, counts: &[usize]) -> Self {
        let mut texts = Vec::with_capacity(counts.len());
        let mut phrases = HashMap::new();
        for (t, &count) in counts.iter().enumerate() {
            let text_id = TextId(format!("t{}", t + 1));
            let mut ids = Vec::with_capacity(count);
            for p in 1..=count {
                let id = PhraseId::derive(&text_id, p);
                let phrase = Phrase {
                    id: id.clone(),
                    target: format!("phrase {p} of {text_id}"),
                    semantic_units: vec![
                        SemanticUnit {
                            target: "phrase".to_string(),
                            translations: vec![format!("unit a {p}")],
                        },
                        SemanticUnit {
                            target: format!("{p} of {text_id}"),
                            translations: vec![format!("unit b {p}"), format!("unit b' {p}")],
                        },
                    ],
                    primary_translation: format!("translation {id}"),
                    distractors: (1..=3).map(|d| format!("distractor {d} for {id}")).collect(),
                };
                phrases.insert(id.clone(), phrase);
                ids.push(id);
            }
            texts.push(Text { id: text_id, phrases: ids });
        }
        Self {
            id: id.to_string(),
            texts,
            phrases,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn texts(&self) -> &[Text] {
        &self.texts
    }

    /// Looks a text up by its 1-based number.
    pub fn text(&self, number: TextNumber) -> Option<&Text> {
        number.checked_sub(1).and_then(|i| self.texts.get(i))
    }

    pub fn phrase(&self, id: &PhraseId) -> Option<&Phrase> {
        self.phrases.get(id)
    }

    /// Per-text phrase counts in corpus order, as the batch planner wants them.
    pub fn phrase_counts(&self) -> Vec<usize> {
        self.texts.iter().map(|t| t.phrases.len()).collect()
    }

    pub fn phrase_ids(&self) -> impl Iterator<Item = &PhraseId> {
        self.texts.iter().flat_map(|t| t.phrases.iter())
    }
}
