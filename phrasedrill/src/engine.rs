//! The challenge orchestrator that sequences a learner through the corpus.
//!
//! `ChallengeManager` owns the cursor (batch, level, text, phrase), the
//! running phase and the progress store. It is a synchronous state machine:
//! the host feeds it `Stimulus` values and it answers by publishing
//! `DrillEvent`s on the bus. Real-world delays are scheduled tasks on a
//! virtual clock that only moves on `Stimulus::Elapsed`.

use crate::common::{Batch, Level, PhraseId, TaskId, TextNumber};
use crate::components::bus::EventBus;
use crate::components::scheduler::Scheduler;
use crate::config::DrillConfig;
use crate::corpus::{Corpus, Phrase};
use crate::events::{DrillEvent, Input, Stimulus, TemplatePath, TimerCommand};
use crate::phases::{
    build_phase, recipe, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer,
};
use crate::planner::{plan_batches, validate_plan};
use crate::progress::{AttemptOutcome, UserProgress};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// A deferred action waiting on the scheduler.
///
/// Every variant carries the identity of its owner so that a task outliving
/// its owner is recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// A phase's own timer, tagged with the activation that scheduled it.
    Phase { generation: u64, timer: PhaseTimer },
    /// The feedback pause after a timeout, tagged with the challenge number.
    Expiry { challenge: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the corpus and the progress store.
    Starting,
    /// A text cover is up; waiting for `Stimulus::Continue`.
    AwaitingCover,
    Running,
    /// Every batch is done. No further challenges are created.
    Exhausted,
}

/// Where the learner currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub batch: Batch,
    pub level: Level,
    /// 0-based index of the current text in the corpus.
    pub text_index: usize,
    pub phrase_index: usize,
}

impl Cursor {
    pub fn text_number(&self) -> TextNumber {
        self.text_index + 1
    }
}

#[doc(hidden)]
struct Challenge {
    phrase: Phrase,
    level: Level,
    recipe: &'static [PhaseKind],
    recipe_index: usize,
    timer_was_started: bool,
    expiry: Option<TaskId>,
}

#[doc(hidden)]
struct PendingActivation {
    kind: PhaseKind,
    template: TemplatePath,
    previous: Option<PhaseKind>,
}

/// One move of the cursor.
#[derive(Debug)]
enum Step {
    /// Go to the first text of the batch not yet complete at the level.
    EnterBatch(Batch, Level),
    EnterText(Batch, Level, TextNumber),
    /// Drill the phrase under the cursor, or finish the text if none is left.
    NextPhrase,
    FinishText,
    CompleteBatch(Batch, Level),
}

/// The top-level drill state machine.
pub struct ChallengeManager {
    config: DrillConfig,
    bus: EventBus,
    progress: UserProgress,
    corpus: Option<Corpus>,
    scheduler: Scheduler<Deferred>,
    rng: StdRng,
    state: SessionState,
    plan: Vec<Batch>,
    cursor: Option<Cursor>,
    cover_due: bool,
    challenge: Option<Challenge>,
    phase: Option<Box<dyn Phase>>,
    pending: Option<PendingActivation>,
    generation: u64,
    challenges_created: u64,
}

impl ChallengeManager {
    /// Creates a manager around `progress`. `bus` should be the same bus the
    /// store publishes on, so listeners see one ordered stream.
    pub fn new(config: DrillConfig, progress: UserProgress, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            progress,
            corpus: None,
            scheduler: Scheduler::new(),
            rng: StdRng::from_entropy(),
            state: SessionState::Starting,
            plan: Vec::new(),
            cursor: None,
            cover_due: false,
            challenge: None,
            phase: None,
            pending: None,
            generation: 0,
            challenges_created: 0,
        }
    }

    /// Makes option shuffling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn plan(&self) -> &[Batch] {
        &self.plan
    }

    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut UserProgress {
        &mut self.progress
    }

    pub fn corpus(&self) -> Option<&Corpus> {
        self.corpus.as_ref()
    }

    /// The phase currently running, if any.
    pub fn current_phase(&self) -> Option<PhaseKind> {
        self.phase.as_ref().map(|p| p.kind())
    }

    pub fn phase_is_active(&self) -> bool {
        self.phase.as_ref().is_some_and(|p| p.is_active())
    }

    /// The template the manager is waiting on before it can start a phase.
    pub fn pending_template(&self) -> Option<TemplatePath> {
        self.pending.as_ref().map(|p| p.template)
    }

    /// How many challenges have been assembled so far.
    pub fn challenges_created(&self) -> u64 {
        self.challenges_created
    }

    /// Virtual time since the manager was created.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// The first non-mastered phrase at or after the phrase cursor within the
    /// current text. `None` once the rest of the text is mastered.
    pub fn current_phrase_id(&self) -> Option<PhraseId> {
        self.current_phrase_position().map(|(_, id)| id)
    }

    fn current_phrase_position(&self) -> Option<(usize, PhraseId)> {
        let cursor = self.cursor.as_ref()?;
        let text = self.corpus.as_ref()?.texts().get(cursor.text_index)?;
        text.phrases
            .iter()
            .enumerate()
            .skip(cursor.phrase_index)
            .find(|(_, id)| !self.progress.is_phrase_mastered(id))
            .map(|(index, id)| (index, id.clone()))
    }

    /// Feeds one stimulus into the state machine.
    pub fn handle(&mut self, stimulus: Stimulus) {
        trace!(?stimulus, "stimulus");
        match stimulus {
            Stimulus::CorpusLoaded(corpus) => {
                if self.state != SessionState::Starting {
                    warn!(corpus = corpus.id(), "Ignoring a corpus delivered after startup.");
                    return;
                }
                info!(corpus = corpus.id(), texts = corpus.texts().len(), "Corpus loaded.");
                self.corpus = Some(corpus);
                self.try_start();
            }
            Stimulus::ProgressReady => self.try_start(),
            Stimulus::Input(input) => self.on_input(input),
            Stimulus::TimerExpired => self.on_countdown_expired(),
            Stimulus::TemplateLoaded(path) => self.on_template_loaded(path),
            Stimulus::Continue => self.on_continue(),
            Stimulus::Elapsed(elapsed) => self.advance_time(elapsed),
        }
    }

    // --- Startup ---

    fn try_start(&mut self) {
        if self.state != SessionState::Starting {
            debug!(state = ?self.state, "ignoring readiness signal after startup");
            return;
        }
        let Some(corpus) = self.corpus.as_ref() else {
            info!("Waiting for the corpus before starting.");
            return;
        };
        if !self.progress.is_ready() {
            info!("Waiting for the progress store before starting.");
            return;
        }

        if let Err(err) = self.progress.register_corpus(corpus) {
            warn!("Phrase registration not persisted: {err}");
        }
        let counts = corpus.phrase_counts();
        self.plan = self.resolve_plan(&counts);

        let resume = self.progress.resume_position();
        if let Err(err) = self.progress.begin_session(&resume) {
            warn!("Session start not persisted: {err}");
        }
        info!(batch = %resume.batch, level = %resume.level, "Drill session starting up...");

        if self.plan.is_empty() {
            self.exhaust();
            return;
        }
        let batch = self.locate_batch(&resume.batch);
        self.state = SessionState::Running;
        self.advance(Step::EnterBatch(batch, resume.level));
    }

    /// The stored plan when it still fits the corpus, otherwise a fresh one.
    fn resolve_plan(&mut self, counts: &[usize]) -> Vec<Batch> {
        if let Some(stored) = self.progress.batch_structure() {
            match validate_plan(counts, stored) {
                Ok(()) => return stored.to_vec(),
                Err(err) => warn!("Stored batch plan does not fit the corpus ({err}); regenerating."),
            }
        }
        self.regenerate_plan(counts)
    }

    fn regenerate_plan(&mut self, counts: &[usize]) -> Vec<Batch> {
        let plan = plan_batches(counts, &self.config.batching);
        info!(batches = plan.len(), "Generated a new batch plan.");
        if let Err(err) = self.progress.set_batch_structure(plan.clone()) {
            warn!("Batch plan not persisted: {err}");
        }
        plan
    }

    /// Finds the plan batch matching a stored position.
    fn locate_batch(&self, wanted: &Batch) -> Batch {
        if self.plan.contains(wanted) {
            return wanted.clone();
        }
        let by_first_text = wanted
            .first()
            .and_then(|text| self.plan.iter().find(|b| b.contains(text)));
        match by_first_text {
            Some(batch) => {
                debug!(stored = %wanted, using = %batch, "stored batch moved in the plan");
                batch.clone()
            }
            None => self.plan.first().cloned().unwrap_or_default(),
        }
    }

    // --- Cursor movement ---

    /// Moves the cursor forward from `step` until it stops on a challenge,
    /// a text cover or the end of the content. Store writes made on the way
    /// land as one.
    fn advance(&mut self, step: Step) {
        self.progress.hold_writes();
        self.run_steps(step);
        if let Err(err) = self.progress.release_writes() {
            warn!("Cursor progress not persisted: {err}");
        }
    }

    fn run_steps(&mut self, mut step: Step) {
        loop {
            if self.state == SessionState::Exhausted {
                return;
            }
            step = match step {
                Step::EnterBatch(batch, level) => {
                    let first_open = batch
                        .texts()
                        .iter()
                        .copied()
                        .find(|&text| !self.progress.is_text_complete(level, text));
                    match first_open {
                        Some(text) => Step::EnterText(batch, level, text),
                        None => Step::CompleteBatch(batch, level),
                    }
                }
                Step::EnterText(batch, level, text) => {
                    debug!(text, %level, "entering text");
                    self.cursor = Some(Cursor {
                        batch,
                        level,
                        text_index: text.saturating_sub(1),
                        phrase_index: 0,
                    });
                    self.cover_due = true;
                    Step::NextPhrase
                }
                Step::NextPhrase => match self.current_phrase_position() {
                    Some((index, phrase)) => {
                        if self.present(index, phrase) {
                            return;
                        }
                        Step::NextPhrase
                    }
                    None => Step::FinishText,
                },
                Step::FinishText => {
                    let Some(cursor) = self.cursor.clone() else {
                        return;
                    };
                    let text = cursor.text_number();
                    if let Err(err) = self.progress.mark_text_complete(cursor.level, text) {
                        warn!("Text completion not persisted: {err}");
                    }
                    info!(text, level = %cursor.level, "Text complete.");
                    if self.progress.is_batch_complete(cursor.level, &cursor.batch) {
                        Step::CompleteBatch(cursor.batch, cursor.level)
                    } else {
                        Step::EnterBatch(cursor.batch, cursor.level)
                    }
                }
                Step::CompleteBatch(batch, level) => {
                    let (next, next_level) = match level {
                        Level::One => {
                            info!(%batch, "Batch complete at LEVEL_1; moving to LEVEL_2.");
                            (batch, Level::Two)
                        }
                        Level::Two => match self.next_batch_after(&batch) {
                            Some(next) => {
                                info!(%batch, %next, "Batch complete at LEVEL_2; moving to the next batch.");
                                (next, Level::One)
                            }
                            None => {
                                self.exhaust();
                                return;
                            }
                        },
                    };
                    if let Err(err) = self.progress.update_current_position(next.clone(), next_level) {
                        warn!("Position change not persisted: {err}");
                    }
                    self.bus.publish(DrillEvent::PositionChanged {
                        batch: next.clone(),
                        level: next_level,
                    });
                    Step::EnterBatch(next, next_level)
                }
            };
        }
    }

    /// Shows the text cover, or builds the challenge for the phrase at
    /// `index`. Returns `false` when the phrase cannot be drilled and the
    /// cursor moved past it.
    fn present(&mut self, index: usize, phrase: PhraseId) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return true;
        };
        cursor.phrase_index = index;
        let level = cursor.level;
        let text_index = cursor.text_index;

        if self.cover_due {
            self.cover_due = false;
            if let Some(text) = self.corpus.as_ref().and_then(|c| c.texts().get(text_index)) {
                info!(text = %text.id, %level, "Showing text cover.");
                self.state = SessionState::AwaitingCover;
                self.bus.publish(DrillEvent::TextCover {
                    text: text.id.clone(),
                    level,
                });
                return true;
            }
        }
        self.state = SessionState::Running;
        if self.assemble_recipe(phrase) {
            return true;
        }
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.phrase_index += 1;
        }
        false
    }

    /// The batch following `batch` in the stored plan, regenerating the plan
    /// when it is missing or no longer contains `batch`.
    fn next_batch_after(&mut self, batch: &Batch) -> Option<Batch> {
        let stored = self
            .progress
            .batch_structure()
            .filter(|plan| plan.contains(batch))
            .map(|plan| plan.to_vec());
        self.plan = match stored {
            Some(plan) => plan,
            None => {
                warn!(%batch, "Current batch is missing from the stored plan; regenerating it.");
                let counts = self
                    .corpus
                    .as_ref()
                    .map(|c| c.phrase_counts())
                    .unwrap_or_default();
                self.regenerate_plan(&counts)
            }
        };
        self.plan
            .iter()
            .find(|candidate| candidate.first() > batch.last())
            .cloned()
    }

    fn exhaust(&mut self) {
        self.teardown_phase();
        self.pending = None;
        self.challenge = None;
        self.state = SessionState::Exhausted;
        info!("All batches complete; no content left.");
        if let Err(err) = self.progress.end_session() {
            warn!("Session end not persisted: {err}");
        }
        self.bus.publish(DrillEvent::ContentExhausted);
    }

    // --- Challenges and phases ---

    /// Starts a challenge for `id`. Returns `false` if the phrase is unknown.
    fn assemble_recipe(&mut self, id: PhraseId) -> bool {
        let Some(phrase) = self.corpus.as_ref().and_then(|c| c.phrase(&id)).cloned() else {
            warn!(%id, "Phrase is missing from the corpus; skipping it.");
            return false;
        };
        let Some(level) = self.cursor.as_ref().map(|c| c.level) else {
            return false;
        };

        self.challenges_created += 1;
        debug!(%id, %level, challenge = self.challenges_created, "assembling recipe");
        self.bus.publish(DrillEvent::Timer(TimerCommand::Reset));
        self.challenge = Some(Challenge {
            phrase,
            level,
            recipe: recipe(level),
            recipe_index: 0,
            timer_was_started: false,
            expiry: None,
        });
        self.activate(0);
        true
    }

    /// Tears down the running phase and asks the renderer for the next
    /// phase's view. The phase starts once the view is acknowledged.
    fn activate(&mut self, index: usize) {
        let Some(kind) = self
            .challenge
            .as_ref()
            .and_then(|c| c.recipe.get(index).copied())
        else {
            self.complete_challenge();
            return;
        };
        let previous = self.teardown_phase();
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.recipe_index = index;
        }
        let template = TemplatePath::for_phase(kind);
        debug!(phase = %kind, %template, "loading template");
        self.pending = Some(PendingActivation {
            kind,
            template,
            previous,
        });
        self.bus.publish(DrillEvent::LoadTemplate(template));
    }

    fn jump_to(&mut self, kind: PhaseKind) {
        let index = self
            .challenge
            .as_ref()
            .and_then(|c| c.recipe.iter().position(|k| *k == kind));
        match index {
            Some(index) => self.activate(index),
            None => warn!(phase = %kind, "phase is not part of the current recipe"),
        }
    }

    fn on_template_loaded(&mut self, path: TemplatePath) {
        if self.pending.as_ref().map(|p| p.template) != Some(path) {
            debug!(%path, "ignoring unexpected template acknowledgement");
            return;
        }
        let (Some(pending), Some(challenge)) = (self.pending.take(), self.challenge.as_ref()) else {
            return;
        };

        let mut phase = build_phase(pending.kind, &challenge.phrase, &self.config.choices, &mut self.rng);
        let phrase = challenge.phrase.id.clone();
        self.generation += 1;
        let mut ctx = PhaseContext::new(
            &mut self.scheduler,
            &self.bus,
            &self.config.timing,
            self.generation,
        );
        phase.start(&mut ctx);
        self.phase = Some(phase);

        debug!(phase = %pending.kind, %phrase, "phase started");
        self.bus.publish(DrillEvent::PhaseStarted {
            phase: pending.kind,
            phrase,
        });
        self.apply_timer_policy(pending.kind, pending.previous);
    }

    /// Drives the countdown device as the recipe moves between phases.
    fn apply_timer_policy(&mut self, kind: PhaseKind, previous: Option<PhaseKind>) {
        let Some(challenge) = self.challenge.as_mut() else {
            return;
        };
        let started = challenge.timer_was_started;
        let command = match (challenge.level, kind) {
            (Level::One, PhaseKind::Solution)
            | (Level::Two, PhaseKind::Retrieval | PhaseKind::Solution) => {
                if started {
                    Some(TimerCommand::Resume)
                } else {
                    Some(TimerCommand::Start)
                }
            }
            (Level::Two, PhaseKind::ReadyOrNot)
                if started && previous == Some(PhaseKind::Retrieval) =>
            {
                Some(TimerCommand::Pause)
            }
            _ => None,
        };
        if let Some(command) = command {
            challenge.timer_was_started = true;
            self.bus.publish(DrillEvent::Timer(command));
        }
    }

    fn teardown_phase(&mut self) -> Option<PhaseKind> {
        let mut phase = self.phase.take()?;
        let mut ctx = PhaseContext::new(
            &mut self.scheduler,
            &self.bus,
            &self.config.timing,
            self.generation,
        );
        phase.cleanup(&mut ctx);
        Some(phase.kind())
    }

    fn on_input(&mut self, input: Input) {
        if self.state != SessionState::Running {
            debug!(?input, state = ?self.state, "ignoring input");
            return;
        }
        let Some(phase) = self.phase.as_mut() else {
            trace!(?input, "no phase running");
            return;
        };
        let mut ctx = PhaseContext::new(
            &mut self.scheduler,
            &self.bus,
            &self.config.timing,
            self.generation,
        );
        if let Some(outcome) = phase.on_input(input, &mut ctx) {
            self.on_outcome(outcome);
        }
    }

    fn on_countdown_expired(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        let Some(phase) = self.phase.as_mut() else {
            return;
        };
        let mut ctx = PhaseContext::new(
            &mut self.scheduler,
            &self.bus,
            &self.config.timing,
            self.generation,
        );
        if let Some(outcome) = phase.on_countdown_expired(&mut ctx) {
            self.on_outcome(outcome);
        }
    }

    fn on_continue(&mut self) {
        if self.state != SessionState::AwaitingCover {
            debug!(state = ?self.state, "ignoring continue");
            return;
        }
        self.state = SessionState::Running;
        self.advance(Step::NextPhrase);
    }

    fn on_outcome(&mut self, outcome: PhaseOutcome) {
        let Some(challenge) = self.challenge.as_ref() else {
            return;
        };
        let phrase = challenge.phrase.id.clone();
        let level = challenge.level;
        let index = challenge.recipe_index;
        debug!(?outcome, %phrase, "phase outcome");

        match outcome {
            PhaseOutcome::SkipToSolution => {
                self.progress.record_attempt_outcome(
                    &phrase,
                    AttemptOutcome {
                        skipped: true,
                        ..AttemptOutcome::default()
                    },
                );
                self.jump_to(PhaseKind::Solution);
            }
            PhaseOutcome::ProceedToRevision | PhaseOutcome::Completed => self.activate(index + 1),
            PhaseOutcome::ProceedToSolution => self.jump_to(PhaseKind::Solution),
            PhaseOutcome::ReturnToRevision => self.jump_to(PhaseKind::revision_for(level)),
            PhaseOutcome::Revealed { unit } => {
                self.progress.record_peek(&phrase, unit);
                self.bus
                    .publish(DrillEvent::TranslationRevealed { phrase, unit });
            }
            PhaseOutcome::Incorrect => {
                self.progress.record_attempt_outcome(
                    &phrase,
                    AttemptOutcome {
                        incorrect_count: 1,
                        ..AttemptOutcome::default()
                    },
                );
                self.bus.publish(DrillEvent::WrongAnswer { phrase });
            }
            PhaseOutcome::Correct => {
                self.bus.publish(DrillEvent::Timer(TimerCommand::Stop));
                self.progress.record_attempt_outcome(
                    &phrase,
                    AttemptOutcome {
                        correct: true,
                        ..AttemptOutcome::default()
                    },
                );
                self.flush_attempt(&phrase, level);
                self.complete_challenge();
            }
            PhaseOutcome::TimedOut => {
                self.bus.publish(DrillEvent::Timer(TimerCommand::Stop));
                self.bus.publish(DrillEvent::LifeLost);
                self.progress
                    .record_attempt_outcome(&phrase, AttemptOutcome::default());
                self.flush_attempt(&phrase, level);
                self.teardown_phase();
                let delay = self.config.timing.expiry_feedback();
                let task = self.scheduler.schedule(
                    delay,
                    Deferred::Expiry {
                        challenge: self.challenges_created,
                    },
                );
                if let Some(challenge) = self.challenge.as_mut() {
                    challenge.expiry = Some(task);
                }
            }
        }
    }

    fn flush_attempt(&mut self, phrase: &PhraseId, level: Level) {
        match self.progress.evaluate_mastery(phrase, level) {
            Ok(evaluation) => debug!(%phrase, level = ?evaluation.resulting_level, "attempt recorded"),
            Err(err) => warn!(%phrase, "Attempt not persisted: {err}"),
        }
    }

    /// Ends the current challenge and moves to the next phrase.
    fn complete_challenge(&mut self) {
        self.teardown_phase();
        self.pending = None;
        if let Some(task) = self.challenge.take().and_then(|c| c.expiry) {
            self.scheduler.cancel(task);
        }
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.phrase_index += 1;
        }
        self.advance(Step::NextPhrase);
    }

    // --- Time ---

    fn advance_time(&mut self, elapsed: Duration) {
        let until = self.scheduler.now() + elapsed;
        while let Some((_, action)) = self.scheduler.pop_due(until) {
            self.on_deferred(action);
        }
        self.scheduler.settle(until);
    }

    fn on_deferred(&mut self, action: Deferred) {
        match action {
            Deferred::Phase { generation, timer } => {
                if generation != self.generation {
                    trace!(generation, ?timer, "dropping stale phase timer");
                    return;
                }
                let Some(phase) = self.phase.as_mut() else {
                    return;
                };
                let mut ctx = PhaseContext::new(
                    &mut self.scheduler,
                    &self.bus,
                    &self.config.timing,
                    self.generation,
                );
                if let Some(outcome) = phase.on_timer(timer, &mut ctx) {
                    self.on_outcome(outcome);
                }
            }
            Deferred::Expiry { challenge } => {
                let current = self.challenge.as_ref().is_some_and(|c| c.expiry.is_some());
                if challenge != self.challenges_created || !current {
                    trace!(challenge, "dropping stale expiry");
                    return;
                }
                if let Some(active) = self.challenge.as_mut() {
                    active.expiry = None;
                }
                self.complete_challenge();
            }
        }
    }
}
