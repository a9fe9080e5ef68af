//! The mastery store: per-phrase attempt history, batch plan, completion
//! state and resume position, persisted as one JSON document.
//!
//! Every mutating call updates the in-memory document first, then writes the
//! whole document and reads it back to verify it. A failed write or a
//! mismatching read-back is retried once; a second failure is returned as
//! `ProgressError::Persistence` and the caller decides whether to carry on
//! with progress that is not durable.

use crate::common::{Batch, Level, PhraseId, TextId, TextNumber};
use crate::components::bus::EventBus;
use crate::corpus::Corpus;
use crate::events::DrillEvent;
use crate::storage::{ProgressStorage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Progress store has not finished loading")]
    NotReady,

    #[error("No phrase progress exists yet; register the corpus first")]
    NoPhraseData,

    #[error("Stored progress document is unreadable: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("Failed to load progress: {0}")]
    Load(#[source] StorageError),

    #[error("Progress was not persisted after {attempts} attempts: {reason}")]
    Persistence { attempts: u32, reason: String },
}

/// Per-phrase mastery tier. Stored as `1`, `2` or `"mastered"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LevelRepr", into = "LevelRepr")]
pub enum MasteryLevel {
    One,
    Two,
    Mastered,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Numeric(u8),
    Named(String),
}

impl TryFrom<LevelRepr> for MasteryLevel {
    type Error = String;

    fn try_from(repr: LevelRepr) -> Result<Self, Self::Error> {
        match repr {
            LevelRepr::Numeric(1) => Ok(MasteryLevel::One),
            LevelRepr::Numeric(2) => Ok(MasteryLevel::Two),
            LevelRepr::Named(name) if name == "mastered" => Ok(MasteryLevel::Mastered),
            LevelRepr::Numeric(n) => Err(format!("unknown mastery level {n}")),
            LevelRepr::Named(name) => Err(format!("unknown mastery level {name:?}")),
        }
    }
}

impl From<MasteryLevel> for LevelRepr {
    fn from(level: MasteryLevel) -> Self {
        match level {
            MasteryLevel::One => LevelRepr::Numeric(1),
            MasteryLevel::Two => LevelRepr::Numeric(2),
            MasteryLevel::Mastered => LevelRepr::Named("mastered".to_string()),
        }
    }
}

/// One flushed phrase visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub skipped: bool,
    pub incorrect_count: u32,
    pub peeked: bool,
    #[serde(default)]
    pub peeked_units: BTreeSet<usize>,
    pub correct_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseProgress {
    pub level: MasteryLevel,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Default for PhraseProgress {
    fn default() -> Self {
        Self {
            level: MasteryLevel::One,
            attempts: Vec::new(),
        }
    }
}

/// Which texts of the current plan are complete, per level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchCompletionState {
    #[serde(default)]
    pub level1: BTreeMap<TextNumber, bool>,
    #[serde(default)]
    pub level2: BTreeMap<TextNumber, bool>,
}

impl BatchCompletionState {
    fn derive(plan: &[Batch]) -> Self {
        let texts: BTreeMap<TextNumber, bool> = plan
            .iter()
            .flat_map(|b| b.texts().iter().map(|&t| (t, false)))
            .collect();
        Self {
            level1: texts.clone(),
            level2: texts,
        }
    }

    fn level(&self, level: Level) -> &BTreeMap<TextNumber, bool> {
        match level {
            Level::One => &self.level1,
            Level::Two => &self.level2,
        }
    }

    fn level_mut(&mut self, level: Level) -> &mut BTreeMap<TextNumber, bool> {
        match level {
            Level::One => &mut self.level1,
            Level::Two => &mut self.level2,
        }
    }
}

/// Where the learner resumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePosition {
    pub batch: Batch,
    pub level: Level,
}

impl Default for ResumePosition {
    fn default() -> Self {
        Self {
            batch: Batch::new(vec![1, 2]),
            level: Level::One,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPosition {
    pub batch: Batch,
    pub level: Level,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub batch: Batch,
    pub level: Level,
    #[serde(default)]
    pub phrases_attempted: u32,
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    #[serde(default)]
    pub batch_structure: Option<Vec<Batch>>,
    #[serde(default)]
    pub batch_completion_state: BatchCompletionState,
    #[serde(default)]
    pub current_position: Option<StoredPosition>,
    #[serde(default)]
    pub phrase_progress: BTreeMap<PhraseId, PhraseProgress>,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

/// What the orchestrator reports after a phase settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptOutcome {
    pub skipped: bool,
    pub incorrect_count: u32,
    pub correct: bool,
}

/// Scratch record for the phrase currently being visited.
#[derive(Debug, Clone, Default)]
struct SessionScratch {
    skipped: bool,
    correct: bool,
    incorrect_count: u32,
    peeked_units: BTreeSet<usize>,
}

/// Result of flushing a phrase visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasteryEvaluation {
    pub phrase: PhraseId,
    pub previous_level: MasteryLevel,
    pub resulting_level: MasteryLevel,
    /// Set when this evaluation completed mastery of the whole text.
    pub text_mastered: Option<TextId>,
}

const WRITE_ATTEMPTS: u32 = 2;

/// The learner's progress, loaded from and written back to a `ProgressStorage`.
pub struct UserProgress {
    storage: Box<dyn ProgressStorage>,
    bus: EventBus,
    document: Option<ProgressDocument>,
    session: HashMap<PhraseId, SessionScratch>,
    held: bool,
    dirty: bool,
}

impl UserProgress {
    /// Creates a store that is not ready until `load` succeeds.
    pub fn new(storage: impl ProgressStorage + 'static, bus: EventBus) -> Self {
        Self {
            storage: Box::new(storage),
            bus,
            document: None,
            session: HashMap::new(),
            held: false,
            dirty: false,
        }
    }

    /// Reads the stored document, starting a fresh one if none exists.
    pub fn load(&mut self) -> Result<(), ProgressError> {
        let document = match self.storage.read().map_err(ProgressError::Load)? {
            Some(raw) => serde_json::from_str(&raw).map_err(ProgressError::Corrupt)?,
            None => {
                info!("No stored progress found; starting a fresh document.");
                ProgressDocument::default()
            }
        };
        self.document = Some(document);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&ProgressDocument> {
        self.document.as_ref()
    }

    fn document_mut(&mut self) -> Result<&mut ProgressDocument, ProgressError> {
        self.document.as_mut().ok_or(ProgressError::NotReady)
    }

    /// Creates level-1 progress entries for corpus phrases not seen before.
    pub fn register_corpus(&mut self, corpus: &Corpus) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        let mut added = 0;
        for id in corpus.phrase_ids() {
            if !document.phrase_progress.contains_key(id) {
                document.phrase_progress.insert(id.clone(), PhraseProgress::default());
                added += 1;
            }
        }
        if added == 0 {
            return Ok(());
        }
        debug!(added, corpus = corpus.id(), "registered new phrases");
        self.persist()
    }

    // --- Batch plan ---

    pub fn batch_structure(&self) -> Option<&[Batch]> {
        self.document.as_ref()?.batch_structure.as_deref()
    }

    /// Stores a new plan and resets completion state for every text in it.
    pub fn set_batch_structure(&mut self, batches: Vec<Batch>) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        if document.phrase_progress.is_empty() {
            return Err(ProgressError::NoPhraseData);
        }
        document.batch_completion_state = BatchCompletionState::derive(&batches);
        document.batch_structure = Some(batches);
        self.persist()
    }

    /// Forgets the plan so the next startup generates a new one.
    pub fn clear_batch_structure(&mut self) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        document.batch_structure = None;
        document.batch_completion_state = BatchCompletionState::default();
        self.persist()
    }

    pub fn mark_text_complete(&mut self, level: Level, text: TextNumber) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        document
            .batch_completion_state
            .level_mut(level)
            .insert(text, true);
        self.persist()
    }

    pub fn is_text_complete(&self, level: Level, text: TextNumber) -> bool {
        self.document
            .as_ref()
            .and_then(|d| d.batch_completion_state.level(level).get(&text).copied())
            .unwrap_or(false)
    }

    pub fn is_batch_complete(&self, level: Level, batch: &Batch) -> bool {
        !batch.is_empty() && batch.texts().iter().all(|&t| self.is_text_complete(level, t))
    }

    // --- Resume position ---

    pub fn resume_position(&self) -> ResumePosition {
        self.document
            .as_ref()
            .and_then(|d| d.current_position.as_ref())
            .map(|p| ResumePosition {
                batch: p.batch.clone(),
                level: p.level,
            })
            .unwrap_or_default()
    }

    pub fn update_current_position(&mut self, batch: Batch, level: Level) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        document.current_position = Some(StoredPosition {
            batch,
            level,
            last_updated: Utc::now(),
        });
        self.persist()
    }

    // --- Attempts and mastery ---

    /// Folds one phase result into the scratch record for `phrase`.
    pub fn record_attempt_outcome(&mut self, phrase: &PhraseId, outcome: AttemptOutcome) {
        let scratch = self.session.entry(phrase.clone()).or_default();
        scratch.skipped |= outcome.skipped;
        scratch.correct |= outcome.correct;
        scratch.incorrect_count += outcome.incorrect_count;
    }

    /// Notes that the learner revealed a hidden unit during retrieval.
    pub fn record_peek(&mut self, phrase: &PhraseId, unit: usize) {
        self.session
            .entry(phrase.clone())
            .or_default()
            .peeked_units
            .insert(unit);
    }

    /// Flushes the scratch record as one attempt and applies the mastery rule.
    ///
    /// A visit masters the phrase when the learner skipped revision, answered
    /// correctly and never answered wrong. Mastery is never revoked.
    pub fn evaluate_mastery(
        &mut self,
        phrase: &PhraseId,
        played_level: Level,
    ) -> Result<MasteryEvaluation, ProgressError> {
        if self.document.is_none() {
            return Err(ProgressError::NotReady);
        }
        let scratch = self.session.remove(phrase).unwrap_or_default();
        let document = self.document_mut()?;

        let entry = document.phrase_progress.entry(phrase.clone()).or_default();
        let previous_level = entry.level;
        entry.attempts.push(AttemptRecord {
            timestamp: Utc::now(),
            skipped: scratch.skipped,
            incorrect_count: scratch.incorrect_count,
            peeked: !scratch.peeked_units.is_empty(),
            peeked_units: scratch.peeked_units,
            correct_answer: scratch.correct,
        });
        let qualifies = scratch.skipped && scratch.correct && scratch.incorrect_count == 0;
        if qualifies {
            entry.level = MasteryLevel::Mastered;
        }
        let resulting_level = entry.level;

        if let Some(session) = document.sessions.last_mut().filter(|s| s.ended_at.is_none()) {
            session.phrases_attempted += 1;
        }

        let newly_mastered =
            previous_level != MasteryLevel::Mastered && resulting_level == MasteryLevel::Mastered;
        let text_mastered = if newly_mastered {
            phrase
                .text_id()
                .filter(|text| text_fully_mastered(document, text))
        } else {
            None
        };

        debug!(%phrase, ?previous_level, ?resulting_level, "attempt flushed");
        self.bus.publish(DrillEvent::AttemptRecorded {
            phrase: phrase.clone(),
            played_level,
            resulting_level,
        });
        if let Some(text) = &text_mastered {
            info!(%text, "every phrase of the text is mastered");
            self.bus.publish(DrillEvent::TextMastered(text.clone()));
        }

        self.persist()?;
        Ok(MasteryEvaluation {
            phrase: phrase.clone(),
            previous_level,
            resulting_level,
            text_mastered,
        })
    }

    pub fn is_phrase_mastered(&self, phrase: &PhraseId) -> bool {
        self.phrase_progress(phrase)
            .is_some_and(|p| p.level == MasteryLevel::Mastered)
    }

    pub fn phrase_progress(&self, phrase: &PhraseId) -> Option<&PhraseProgress> {
        self.document.as_ref()?.phrase_progress.get(phrase)
    }

    // --- Sessions ---

    /// Counts a new game and opens a session record.
    pub fn begin_session(&mut self, position: &ResumePosition) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        document.games_played += 1;
        document.sessions.push(SessionRecord {
            started_at: Utc::now(),
            ended_at: None,
            batch: position.batch.clone(),
            level: position.level,
            phrases_attempted: 0,
        });
        self.persist()
    }

    /// Stamps the open session record, if any.
    pub fn end_session(&mut self) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        match document.sessions.last_mut().filter(|s| s.ended_at.is_none()) {
            Some(session) => session.ended_at = Some(Utc::now()),
            None => return Ok(()),
        }
        self.persist()
    }

    /// Wipes all progress: levels, attempts, plan, completion and position.
    pub fn reset(&mut self) -> Result<(), ProgressError> {
        let document = self.document_mut()?;
        for progress in document.phrase_progress.values_mut() {
            *progress = PhraseProgress::default();
        }
        document.batch_structure = None;
        document.batch_completion_state = BatchCompletionState::default();
        document.current_position = None;
        document.games_played = 0;
        document.sessions.clear();
        self.session.clear();
        info!("Progress reset.");
        self.persist()
    }

    // --- Persistence ---

    /// Keeps further changes in memory until `release_writes`.
    pub fn hold_writes(&mut self) {
        self.held = true;
    }

    /// Ends a `hold_writes` span with a single write if anything changed.
    pub fn release_writes(&mut self) -> Result<(), ProgressError> {
        self.held = false;
        if !std::mem::take(&mut self.dirty) {
            return Ok(());
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<(), ProgressError> {
        let Some(document) = self.document.as_ref() else {
            return Err(ProgressError::NotReady);
        };
        if self.held {
            self.dirty = true;
            return Ok(());
        }
        let mut reason = String::new();
        for attempt in 1..=WRITE_ATTEMPTS {
            match write_and_verify(self.storage.as_mut(), document) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, "progress write failed: {err}");
                    reason = err;
                }
            }
        }
        Err(ProgressError::Persistence {
            attempts: WRITE_ATTEMPTS,
            reason,
        })
    }
}

fn write_and_verify(storage: &mut dyn ProgressStorage, document: &ProgressDocument) -> Result<(), String> {
    let encoded = serde_json::to_string(document).map_err(|e| format!("serialization failed: {e}"))?;
    storage.write(&encoded).map_err(|e| e.to_string())?;
    let stored = storage
        .read()
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "document missing after write".to_string())?;
    let decoded: ProgressDocument =
        serde_json::from_str(&stored).map_err(|e| format!("read-back is unreadable: {e}"))?;
    if &decoded != document {
        return Err("read-back does not match the written document".to_string());
    }
    Ok(())
}

fn text_fully_mastered(document: &ProgressDocument, text: &TextId) -> bool {
    let mut phrases = document
        .phrase_progress
        .iter()
        .filter(|(id, _)| id.text_id().as_ref() == Some(text))
        .peekable();
    phrases.peek().is_some() && phrases.all(|(_, p)| p.level == MasteryLevel::Mastered)
}
