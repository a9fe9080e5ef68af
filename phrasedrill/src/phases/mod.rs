//! The single-phrase sub-machines a recipe is assembled from.
//!
//! Every phase implements `Phase`. A phase is inert until `start`, waits out
//! a short grace period before it accepts input, and reports progress back to
//! the orchestrator as a `PhaseOutcome`. Phases never touch the cursor or the
//! progress store; they only draw (`ViewEvent`) and schedule their own
//! deferred work through the `PhaseContext` they are handed.

pub mod choices;
mod presentation;
mod ready_or_not;
mod retrieval;
mod revision;
mod solution;

pub use presentation::Presentation;
pub use ready_or_not::ReadyOrNot;
pub use retrieval::Retrieval;
pub use revision::Revision;
pub use solution::Solution;

use crate::common::{Level, TaskId};
use crate::components::bus::EventBus;
use crate::components::scheduler::Scheduler;
use crate::config::{ChoiceConfig, TimingConfig};
use crate::corpus::Phrase;
use crate::engine::Deferred;
use crate::events::{DrillEvent, Input, ViewEvent};
use choices::ChoiceSet;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// The five phase variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Presentation,
    Revision,
    Retrieval,
    ReadyOrNot,
    Solution,
}

impl PhaseKind {
    /// The phase `ReturnToRevision` leads back to at `level`.
    pub fn revision_for(level: Level) -> Self {
        match level {
            Level::One => PhaseKind::Revision,
            Level::Two => PhaseKind::Retrieval,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Presentation => "presentation",
            PhaseKind::Revision => "revision",
            PhaseKind::Retrieval => "retrieval",
            PhaseKind::ReadyOrNot => "ready-or-not",
            PhaseKind::Solution => "solution",
        };
        f.write_str(name)
    }
}

const LEVEL_ONE_RECIPE: [PhaseKind; 4] = [
    PhaseKind::Presentation,
    PhaseKind::Revision,
    PhaseKind::ReadyOrNot,
    PhaseKind::Solution,
];

const LEVEL_TWO_RECIPE: [PhaseKind; 4] = [
    PhaseKind::Presentation,
    PhaseKind::Retrieval,
    PhaseKind::ReadyOrNot,
    PhaseKind::Solution,
];

/// The fixed phase sequence every phrase goes through at `level`.
pub fn recipe(level: Level) -> &'static [PhaseKind] {
    match level {
        Level::One => &LEVEL_ONE_RECIPE,
        Level::Two => &LEVEL_TWO_RECIPE,
    }
}

/// What a phase reports back to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Presentation: the learner jumped straight to the solution.
    SkipToSolution,
    /// Presentation: the learner asked for revision.
    ProceedToRevision,
    /// Revision or Retrieval ran past its last unit (or the countdown ran out).
    Completed,
    /// ReadyOrNot: the learner is ready to answer.
    ProceedToSolution,
    /// ReadyOrNot: the learner wants another look.
    ReturnToRevision,
    /// Retrieval: a hidden unit was revealed. The phase keeps running.
    Revealed { unit: usize },
    /// Solution: a wrong option was submitted. The phase keeps running.
    Incorrect,
    /// Solution: the primary translation was submitted and acknowledged.
    Correct,
    /// Solution: the countdown ran out and the overlay was shown.
    TimedOut,
}

/// Deferred work a phase schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTimer {
    /// The grace period ended; start accepting input.
    Activate,
    /// Answer feedback has been visible long enough.
    Feedback { correct: bool },
    /// The timeout overlay has been visible long enough.
    TimeoutOverlay,
}

/// Everything a phase may reach while it handles a stimulus.
pub struct PhaseContext<'a> {
    scheduler: &'a mut Scheduler<Deferred>,
    bus: &'a EventBus,
    timing: &'a TimingConfig,
    generation: u64,
}

impl<'a> PhaseContext<'a> {
    pub fn new(
        scheduler: &'a mut Scheduler<Deferred>,
        bus: &'a EventBus,
        timing: &'a TimingConfig,
        generation: u64,
    ) -> Self {
        Self {
            scheduler,
            bus,
            timing,
            generation,
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        self.timing
    }

    /// Schedules `timer` for the running phase. The returned id is the
    /// phase's cancellation token.
    pub fn schedule(&mut self, delay: Duration, timer: PhaseTimer) -> TaskId {
        self.scheduler.schedule(
            delay,
            Deferred::Phase {
                generation: self.generation,
                timer,
            },
        )
    }

    pub fn cancel(&mut self, task: TaskId) {
        self.scheduler.cancel(task);
    }

    pub fn emit(&self, view: ViewEvent) {
        self.bus.publish(DrillEvent::View(view));
    }
}

/// A single-phrase sub-machine.
pub trait Phase: Send {
    fn kind(&self) -> PhaseKind;

    /// `true` once the grace period has passed and until cleanup.
    fn is_active(&self) -> bool;

    /// Draws the phase and arms its grace period.
    fn start(&mut self, ctx: &mut PhaseContext<'_>);

    /// Handles a key press. Ignored while inactive.
    fn on_input(&mut self, input: Input, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome>;

    /// Handles one of the phase's own deferred tasks.
    fn on_timer(&mut self, timer: PhaseTimer, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome>;

    /// Handles the countdown device running out. Most phases do not care.
    fn on_countdown_expired(&mut self, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        None
    }

    /// Deactivates the phase and cancels everything it scheduled.
    /// Safe to call more than once.
    fn cleanup(&mut self, ctx: &mut PhaseContext<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GateState {
    #[default]
    Idle,
    Arming,
    Open,
    Closed,
}

/// The grace period every phase waits out before it accepts input, so that
/// a key press meant for the previous phase is not consumed by this one.
#[derive(Debug, Default)]
pub struct ActivationGate {
    state: GateState,
    task: Option<TaskId>,
}

impl ActivationGate {
    pub fn arm(&mut self, ctx: &mut PhaseContext<'_>) {
        if self.state != GateState::Idle {
            return;
        }
        let grace = ctx.timing().activation_grace();
        self.task = Some(ctx.schedule(grace, PhaseTimer::Activate));
        self.state = GateState::Arming;
    }

    /// Opens the gate. Returns `false` if it was not waiting to open.
    pub fn open(&mut self) -> bool {
        if self.state != GateState::Arming {
            return false;
        }
        self.task = None;
        self.state = GateState::Open;
        true
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    pub fn close(&mut self, ctx: &mut PhaseContext<'_>) {
        if let Some(task) = self.task.take() {
            ctx.cancel(task);
        }
        self.state = GateState::Closed;
    }
}

/// Builds the phase for `kind` with the subset of `phrase` it needs.
///
/// The Solution option set is shuffled here, so every activation gets a
/// fresh permutation.
pub fn build_phase<R: Rng + ?Sized>(
    kind: PhaseKind,
    phrase: &Phrase,
    choices: &ChoiceConfig,
    rng: &mut R,
) -> Box<dyn Phase> {
    match kind {
        PhaseKind::Presentation => Box::new(Presentation::new(phrase.target.clone())),
        PhaseKind::Revision => Box::new(Revision::new(phrase.semantic_units.clone())),
        PhaseKind::Retrieval => Box::new(Retrieval::new(phrase.semantic_units.clone())),
        PhaseKind::ReadyOrNot => Box::new(ReadyOrNot::new()),
        PhaseKind::Solution => Box::new(Solution::new(ChoiceSet::shuffled(
            &phrase.primary_translation,
            &phrase.distractors,
            choices.max_distractors,
            rng,
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::common::PhraseId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn recipes_differ_only_in_the_revision_step() {
        assert_eq!(
            recipe(Level::One),
            &[
                PhaseKind::Presentation,
                PhaseKind::Revision,
                PhaseKind::ReadyOrNot,
                PhaseKind::Solution
            ]
        );
        assert_eq!(
            recipe(Level::Two),
            &[
                PhaseKind::Presentation,
                PhaseKind::Retrieval,
                PhaseKind::ReadyOrNot,
                PhaseKind::Solution
            ]
        );
        assert_eq!(PhaseKind::revision_for(Level::Two), PhaseKind::Retrieval);
    }

    #[test]
    fn build_phase_produces_the_requested_kind() {
        let corpus = Corpus::synthetic("test", &[1]);
        let phrase = corpus.phrase(&PhraseId::from("t1_p1")).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for kind in recipe(Level::One).iter().chain(recipe(Level::Two)) {
            let phase = build_phase(*kind, phrase, &ChoiceConfig::default(), &mut rng);
            assert_eq!(phase.kind(), *kind);
            assert!(!phase.is_active());
        }
    }

    #[test]
    fn gate_opens_only_after_arming() {
        let mut harness = harness::Harness::new();
        let mut gate = ActivationGate::default();
        assert!(!gate.open());

        let mut ctx = harness.ctx();
        gate.arm(&mut ctx);
        gate.close(&mut ctx);
        assert_eq!(harness.scheduler.pending(), 0);
        assert!(!gate.open());
        assert!(!gate.is_open());
    }
}
