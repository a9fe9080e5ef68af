//! # Phrasedrill
//!
//! A challenge orchestration and mastery engine for phrase-based language
//! drills.
//!
//! Phrasedrill sequences a learner through a corpus of texts. Texts are
//! grouped into size-bounded batches, every batch is played twice (first
//! revision-assisted, then retrieval-tested) and every phrase goes through a
//! fixed recipe of phases ending in a multiple-choice answer. Attempts are
//! recorded per phrase and a phrase counts as mastered once the learner skips
//! straight to the answer and gets it right first time.
//!
//! ## Core Concepts
//!
//! - **ChallengeManager**: The synchronous state machine at the top. It owns
//!   the cursor and the running phase, and is driven by `Stimulus` values.
//! - **EventBus**: Every outbound signal (template loads, countdown commands,
//!   view updates, analytics) is a `DrillEvent` delivered synchronously to the
//!   subscribed collaborators.
//! - **UserProgress**: The mastery store. It persists one JSON document per
//!   learner through a `ProgressStorage` backend and verifies every write.
//! - **Virtual time**: Grace periods and feedback delays are scheduled tasks
//!   that fire when the host reports elapsed time, which keeps the engine
//!   deterministic under test.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use phrasedrill::prelude::*;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = DrillConfig::load(None)?;
//!     let bus = EventBus::new();
//!     bus.subscribe_all(|event| {
//!         println!("{event:?}");
//!         Ok(())
//!     });
//!
//!     let mut progress = UserProgress::new(FileStorage::new("progress.json"), bus.clone());
//!     progress.load()?;
//!
//!     let mut manager = ChallengeManager::new(config, progress, bus);
//!     manager.handle(Stimulus::ProgressReady);
//!     manager.handle(Stimulus::CorpusLoaded(Corpus::synthetic("demo", &[4, 5, 3])));
//!     manager.handle(Stimulus::Continue);
//!     if let Some(template) = manager.pending_template() {
//!         manager.handle(Stimulus::TemplateLoaded(template));
//!     }
//!     manager.handle(Stimulus::Elapsed(Duration::from_millis(100)));
//!     manager.handle(Stimulus::Input(Input::Enter));
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Phrasedrill";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod events;
pub mod phases;
pub mod planner;
pub mod progress;
pub mod storage;

/// A prelude module for easy importing of the most common Phrasedrill types.
pub mod prelude {
    pub use crate::common::{Batch, Level, PhraseId, TextId};
    pub use crate::components::bus::EventBus;
    pub use crate::config::DrillConfig;
    pub use crate::corpus::Corpus;
    pub use crate::engine::{ChallengeManager, SessionState};
    pub use crate::events::{DrillEvent, Input, Stimulus, TemplatePath, TimerCommand, Topic, ViewEvent};
    pub use crate::phases::PhaseKind;
    pub use crate::progress::{MasteryLevel, UserProgress};
    pub use crate::storage::{FileStorage, MemoryStorage, ProgressStorage};
}
