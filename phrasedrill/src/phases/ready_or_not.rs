use super::{ActivationGate, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer};
use crate::events::Input;

/// Checkpoint between revising and answering.
#[derive(Debug, Default)]
pub struct ReadyOrNot {
    gate: ActivationGate,
}

impl ReadyOrNot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Phase for ReadyOrNot {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ReadyOrNot
    }

    fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    fn start(&mut self, ctx: &mut PhaseContext<'_>) {
        self.gate.arm(ctx);
    }

    fn on_input(&mut self, input: Input, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if !self.gate.is_open() {
            return None;
        }
        match input {
            Input::Enter => Some(PhaseOutcome::ProceedToSolution),
            Input::Space => Some(PhaseOutcome::ReturnToRevision),
        }
    }

    fn on_timer(&mut self, timer: PhaseTimer, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if timer == PhaseTimer::Activate {
            self.gate.open();
        }
        None
    }

    fn cleanup(&mut self, ctx: &mut PhaseContext<'_>) {
        self.gate.close(ctx);
    }
}
