use super::{ActivationGate, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer};
use crate::corpus::SemanticUnit;
use crate::events::{Input, ViewEvent};

/// Walks the semantic units one at a time with their translations visible.
#[derive(Debug)]
pub struct Revision {
    units: Vec<SemanticUnit>,
    // `None` sits before the first unit.
    current: Option<usize>,
    gate: ActivationGate,
}

impl Revision {
    pub fn new(units: Vec<SemanticUnit>) -> Self {
        Self {
            units,
            current: None,
            gate: ActivationGate::default(),
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }
}

impl Phase for Revision {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Revision
    }

    fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    fn start(&mut self, ctx: &mut PhaseContext<'_>) {
        self.current = None;
        self.gate.arm(ctx);
    }

    fn on_input(&mut self, input: Input, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if !self.gate.is_open() || input != Input::Space {
            return None;
        }
        let next = self.current.map_or(0, |i| i + 1);
        let Some(unit) = self.units.get(next) else {
            return Some(PhaseOutcome::Completed);
        };
        self.current = Some(next);
        ctx.emit(ViewEvent::ShowUnit {
            index: next,
            target: unit.target.clone(),
            translations: unit.translations.clone(),
        });
        None
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
