use super::{ActivationGate, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer};
use crate::events::{Input, ViewEvent};

/// Shows the full target sentence and lets the learner choose between
/// revising it or going straight to the answer.
#[derive(Debug)]
pub struct Presentation {
    target: String,
    gate: ActivationGate,
}

impl Presentation {
    pub fn new(target: String) -> Self {
        Self {
            target,
            gate: ActivationGate::default(),
        }
    }
}

impl Phase for Presentation {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Presentation
    }

    fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    fn start(&mut self, ctx: &mut PhaseContext<'_>) {
        ctx.emit(ViewEvent::ShowTarget {
            target: self.target.clone(),
        });
        self.gate.arm(ctx);
    }

    fn on_input(&mut self, input: Input, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if !self.gate.is_open() {
            return None;
        }
        match input {
            Input::Enter => Some(PhaseOutcome::SkipToSolution),
            Input::Space => Some(PhaseOutcome::ProceedToRevision),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::harness::Harness;

    #[test]
    fn ignores_input_during_grace_period() {
        let mut harness = Harness::new();
        let mut phase = Presentation::new("Bonjour.".to_string());
        harness.start(&mut phase);

        assert_eq!(harness.input(&mut phase, Input::Enter), None);
        harness.elapse(&mut phase, 100);
        assert_eq!(harness.input(&mut phase, Input::Enter), Some(PhaseOutcome::SkipToSolution));
        assert_eq!(
            harness.take_views(),
            vec![ViewEvent::ShowTarget {
                target: "Bonjour.".to_string()
            }]
        );
    }

    #[test]
    fn space_asks_for_revision() {
        let mut harness = Harness::new();
        let mut phase = Presentation::new("Bonjour.".to_string());
        harness.activate(&mut phase);
        assert_eq!(harness.input(&mut phase, Input::Space), Some(PhaseOutcome::ProceedToRevision));
    }

    #[test]
    fn cleanup_is_idempotent_and_cancels_the_grace_timer() {
        let mut harness = Harness::new();
        let mut phase = Presentation::new("Bonjour.".to_string());
        harness.start(&mut phase);
        harness.cleanup(&mut phase);
        harness.cleanup(&mut phase);

        assert_eq!(harness.scheduler.pending(), 0);
        harness.elapse(&mut phase, 1000);
        assert!(!phase.is_active());
        assert_eq!(harness.input(&mut phase, Input::Space), None);
    }
}
