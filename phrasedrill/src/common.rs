//! Contains common, primitive types shared across the engine.
//!
//! This module defines the identifiers used for texts, phrases, bus listeners
//! and scheduled tasks, plus the two difficulty levels and the `Batch` type
//! produced by the planner. Using distinct types keeps the cursor arithmetic
//! in the orchestrator honest.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies a subscriber registered on the `EventBus`.
    ///
    /// The key is returned by `subscribe` and is never reused, so a stale id
    /// cannot accidentally unsubscribe somebody else.
    pub struct ListenerId;

    /// Identifies a deferred callback held by the `Scheduler`.
    ///
    /// Whoever scheduled the task keeps the id as its cancellation token.
    pub struct TaskId;
}

/// A 1-based position of a text inside the corpus ordering.
pub type TextNumber = usize;

/// Identifies a text of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextId(pub String);

impl TextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a phrase. Always shaped `<textId>_p<n>` with a 1-based `n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseId(pub String);

impl PhraseId {
    /// Derives the id of the `position`-th (1-based) phrase of `text`.
    pub fn derive(text: &TextId, position: usize) -> Self {
        Self(format!("{}_p{}", text.0, position))
    }

    /// The text this phrase belongs to, recovered from the id itself.
    pub fn text_id(&self) -> Option<TextId> {
        self.0
            .rsplit_once("_p")
            .filter(|(_, n)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .map(|(text, _)| TextId(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhraseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhraseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The difficulty tier applied to a whole batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Revision-assisted: translations are shown unit by unit.
    #[serde(rename = "LEVEL_1")]
    One,
    /// Retrieval-tested: translations are hidden until peeked.
    #[serde(rename = "LEVEL_2")]
    Two,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::One => f.write_str("LEVEL_1"),
            Level::Two => f.write_str("LEVEL_2"),
        }
    }
}

/// A contiguous, ascending group of 1-based text numbers processed together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch(pub Vec<TextNumber>);

impl Batch {
    pub fn new(texts: Vec<TextNumber>) -> Self {
        Self(texts)
    }

    pub fn texts(&self) -> &[TextNumber] {
        &self.0
    }

    pub fn first(&self) -> Option<TextNumber> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<TextNumber> {
        self.0.last().copied()
    }

    pub fn contains(&self, text: TextNumber) -> bool {
        self.0.contains(&text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sums the phrase counts of the texts in this batch.
    ///
    /// `counts` is indexed by 0-based text position; unknown texts count as zero.
    pub fn total(&self, counts: &[usize]) -> usize {
        self.0
            .iter()
            .filter_map(|n| n.checked_sub(1).and_then(|i| counts.get(i)))
            .sum()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_id_round_trips_its_text() {
        let text = TextId::new("lesson_03");
        let phrase = PhraseId::derive(&text, 4);
        assert_eq!(phrase.as_str(), "lesson_03_p4");
        assert_eq!(phrase.text_id(), Some(text));
    }

    #[test]
    fn malformed_phrase_id_has_no_text() {
        assert_eq!(PhraseId::from("plain").text_id(), None);
        assert_eq!(PhraseId::from("t1_pX").text_id(), None);
    }

    #[test]
    fn level_serializes_with_legacy_names() {
        assert_eq!(serde_json::to_string(&Level::One).unwrap(), "\"LEVEL_1\"");
        let parsed: Level = serde_json::from_str("\"LEVEL_2\"").unwrap();
        assert_eq!(parsed, Level::Two);
    }

    #[test]
    fn batch_total_ignores_unknown_texts() {
        let batch = Batch::new(vec![1, 2, 9]);
        assert_eq!(batch.total(&[4, 5, 3]), 9);
    }
}
