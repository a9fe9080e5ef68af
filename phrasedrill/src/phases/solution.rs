use super::choices::ChoiceSet;
use super::{ActivationGate, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer};
use crate::common::TaskId;
use crate::events::{Input, ViewEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Selecting,
    Feedback { correct: bool },
    TimedOut,
    Done,
}

/// Multiple choice over the primary translation and its distractors.
///
/// Space cycles the highlight, Enter submits it. A wrong answer is reported
/// immediately as `Incorrect`, its feedback stays up for the feedback
/// duration and selection then resumes on the same option. A right answer
/// reports `Correct` only once its feedback has been shown.
#[derive(Debug)]
pub struct Solution {
    choices: ChoiceSet,
    highlight: usize,
    mode: Mode,
    gate: ActivationGate,
    pending: Option<TaskId>,
}

impl Solution {
    pub fn new(choices: ChoiceSet) -> Self {
        Self {
            choices,
            highlight: 0,
            mode: Mode::Selecting,
            gate: ActivationGate::default(),
            pending: None,
        }
    }

    pub fn choices(&self) -> &ChoiceSet {
        &self.choices
    }

    pub fn highlight(&self) -> usize {
        self.highlight
    }

    fn cancel_pending(&mut self, ctx: &mut PhaseContext<'_>) {
        if let Some(task) = self.pending.take() {
            ctx.cancel(task);
        }
    }

    fn submit(&mut self, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        let correct = self.choices.is_correct(self.highlight);
        self.mode = Mode::Feedback { correct };
        ctx.emit(ViewEvent::Feedback { correct });
        let delay = ctx.timing().answer_feedback();
        self.pending = Some(ctx.schedule(delay, PhaseTimer::Feedback { correct }));
        (!correct).then_some(PhaseOutcome::Incorrect)
    }
}

impl Phase for Solution {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Solution
    }

    fn is_active(&self) -> bool {
        self.gate.is_open() && self.mode != Mode::Done
    }

    fn start(&mut self, ctx: &mut PhaseContext<'_>) {
        self.highlight = 0;
        self.mode = Mode::Selecting;
        ctx.emit(ViewEvent::ShowChoices {
            options: self.choices.options().to_vec(),
        });
        ctx.emit(ViewEvent::Highlight { index: 0 });
        self.gate.arm(ctx);
    }

    fn on_input(&mut self, input: Input, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if !self.gate.is_open() || self.mode != Mode::Selecting {
            return None;
        }
        match input {
            Input::Space => {
                if !self.choices.is_empty() {
                    self.highlight = (self.highlight + 1) % self.choices.len();
                    ctx.emit(ViewEvent::Highlight {
                        index: self.highlight,
                    });
                }
                None
            }
            Input::Enter => self.submit(ctx),
        }
    }

    fn on_timer(&mut self, timer: PhaseTimer, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        match (timer, self.mode) {
            (PhaseTimer::Activate, _) => {
                self.gate.open();
                None
            }
            (PhaseTimer::Feedback { correct: true }, Mode::Feedback { correct: true }) => {
                self.pending = None;
                self.mode = Mode::Done;
                Some(PhaseOutcome::Correct)
            }
            (PhaseTimer::Feedback { correct: false }, Mode::Feedback { correct: false }) => {
                self.pending = None;
                self.mode = Mode::Selecting;
                ctx.emit(ViewEvent::ClearFeedback);
                None
            }
            (PhaseTimer::TimeoutOverlay, Mode::TimedOut) => {
                self.pending = None;
                self.mode = Mode::Done;
                Some(PhaseOutcome::TimedOut)
            }
            _ => None,
        }
    }

    fn on_countdown_expired(&mut self, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        // A correct answer already on screen wins over the countdown.
        let expirable = matches!(self.mode, Mode::Selecting | Mode::Feedback { correct: false });
        if !self.gate.is_open() || !expirable {
            return None;
        }
        self.cancel_pending(ctx);
        self.mode = Mode::TimedOut;
        ctx.emit(ViewEvent::TimeoutOverlay);
        let delay = ctx.timing().timeout_overlay();
        self.pending = Some(ctx.schedule(delay, PhaseTimer::TimeoutOverlay));
        None
    }

    fn cleanup(&mut self, ctx: &mut PhaseContext<'_>) {
        self.cancel_pending(ctx);
        self.gate.close(ctx);
        self.mode = Mode::Done;
    }
}
