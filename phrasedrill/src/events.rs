//! Defines all public event types flowing in and out of the engine.
//!
//! `DrillEvent`s are published on the `EventBus` for collaborators (renderer,
//! countdown device, life counter, analytics) to consume. `Stimulus` is the
//! other direction: the only ways the outside world moves the engine.

use crate::common::{Batch, Level, PhraseId, TextId};
use crate::corpus::Corpus;
use crate::phases::PhaseKind;
use crate::progress::MasteryLevel;
use std::fmt;
use std::time::Duration;

/// The named topics a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Template loading requests for the renderer.
    Template,
    /// Countdown device commands.
    Timer,
    /// Phase lifecycle and per-phase view updates.
    Phase,
    /// Attempt, mastery and life-counter signals.
    Progress,
    /// Cursor movement, text covers and content exhaustion.
    Session,
}

/// Views the renderer knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplatePath {
    Presentation,
    Game,
    ReadyOrNot,
}

impl TemplatePath {
    /// The fixed view each recipe phase renders into.
    pub fn for_phase(phase: PhaseKind) -> Self {
        match phase {
            PhaseKind::Presentation => TemplatePath::Presentation,
            PhaseKind::Revision | PhaseKind::Retrieval | PhaseKind::Solution => TemplatePath::Game,
            PhaseKind::ReadyOrNot => TemplatePath::ReadyOrNot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplatePath::Presentation => "templates/presentation.html",
            TemplatePath::Game => "templates/game.html",
            TemplatePath::ReadyOrNot => "templates/ready-or-not.html",
        }
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands for the external countdown device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Resume,
    Reset,
    Stop,
}

/// What a phase wants drawn. Purely informational for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The full target sentence.
    ShowTarget { target: String },
    /// A semantic unit became current; `translations` is empty while hidden.
    ShowUnit {
        index: usize,
        target: String,
        translations: Vec<String>,
    },
    /// Hidden translations of the current unit were revealed.
    RevealTranslations { index: usize, translations: Vec<String> },
    /// Translations of a unit were hidden again before moving on.
    HideTranslations { index: usize },
    /// The shuffled multiple-choice options.
    ShowChoices { options: Vec<String> },
    /// The highlighted option moved.
    Highlight { index: usize },
    /// Correct or incorrect feedback is on screen.
    Feedback { correct: bool },
    /// Feedback was taken down and selection resumed.
    ClearFeedback,
    /// The countdown expired while the phase was active.
    TimeoutOverlay,
}

/// Everything the engine publishes on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum DrillEvent {
    /// Ask the renderer to load a view; answered with `Stimulus::TemplateLoaded`.
    LoadTemplate(TemplatePath),
    /// Drive the countdown device.
    Timer(TimerCommand),
    /// A phase was built and started. It accepts input once its grace
    /// period has passed.
    PhaseStarted { phase: PhaseKind, phrase: PhraseId },
    /// A phase-level view update.
    View(ViewEvent),
    /// A hidden translation was revealed during retrieval. The countdown
    /// device owns the time penalty for this.
    TranslationRevealed { phrase: PhraseId, unit: usize },
    /// The learner submitted a wrong option.
    WrongAnswer { phrase: PhraseId },
    /// The countdown expired on the solution phase.
    LifeLost,
    /// Analytics record emitted each time an attempt is flushed.
    AttemptRecorded {
        phrase: PhraseId,
        played_level: Level,
        resulting_level: MasteryLevel,
    },
    /// Every phrase of a text is mastered.
    TextMastered(TextId),
    /// A text is about to start; waits for `Stimulus::Continue`.
    TextCover { text: TextId, level: Level },
    /// The resume position moved to a new batch or level.
    PositionChanged { batch: Batch, level: Level },
    /// No batch remains; the session will not create further challenges.
    ContentExhausted,
}

impl DrillEvent {
    /// The topic this event is delivered under.
    pub fn topic(&self) -> Topic {
        match self {
            DrillEvent::LoadTemplate(_) => Topic::Template,
            DrillEvent::Timer(_) => Topic::Timer,
            DrillEvent::PhaseStarted { .. }
            | DrillEvent::View(_)
            | DrillEvent::TranslationRevealed { .. } => Topic::Phase,
            DrillEvent::WrongAnswer { .. }
            | DrillEvent::LifeLost
            | DrillEvent::AttemptRecorded { .. }
            | DrillEvent::TextMastered(_) => Topic::Progress,
            DrillEvent::TextCover { .. }
            | DrillEvent::PositionChanged { .. }
            | DrillEvent::ContentExhausted => Topic::Session,
        }
    }
}

/// A normalized key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Enter,
    Space,
}

/// The external stimuli that drive the `ChallengeManager`.
#[derive(Debug)]
pub enum Stimulus {
    /// The corpus finished loading.
    CorpusLoaded(Corpus),
    /// The progress store finished its startup load.
    ProgressReady,
    /// A normalized key press.
    Input(Input),
    /// The countdown device ran out.
    TimerExpired,
    /// The renderer finished loading a view.
    TemplateLoaded(TemplatePath),
    /// The learner dismissed a text cover.
    Continue,
    /// Real time passed; fires due scheduled tasks.
    Elapsed(Duration),
}
