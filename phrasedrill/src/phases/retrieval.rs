use super::{ActivationGate, Phase, PhaseContext, PhaseKind, PhaseOutcome, PhaseTimer};
use crate::corpus::SemanticUnit;
use crate::events::{Input, ViewEvent};

/// Walks the semantic units with translations hidden. Enter reveals the
/// current unit, Space hides it again and moves on.
#[derive(Debug)]
pub struct Retrieval {
    units: Vec<SemanticUnit>,
    current: Option<usize>,
    revealed: bool,
    gate: ActivationGate,
}

impl Retrieval {
    pub fn new(units: Vec<SemanticUnit>) -> Self {
        Self {
            units,
            current: None,
            revealed: false,
            gate: ActivationGate::default(),
        }
    }

    fn reveal(&mut self, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        let index = self.current?;
        if self.revealed {
            return None;
        }
        let unit = self.units.get(index)?;
        self.revealed = true;
        ctx.emit(ViewEvent::RevealTranslations {
            index,
            translations: unit.translations.clone(),
        });
        Some(PhaseOutcome::Revealed { unit: index })
    }

    fn advance(&mut self, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if let Some(index) = self.current.filter(|_| self.revealed) {
            ctx.emit(ViewEvent::HideTranslations { index });
        }
        self.revealed = false;

        let next = self.current.map_or(0, |i| i + 1);
        let Some(unit) = self.units.get(next) else {
            return Some(PhaseOutcome::Completed);
        };
        self.current = Some(next);
        ctx.emit(ViewEvent::ShowUnit {
            index: next,
            target: unit.target.clone(),
            translations: Vec::new(),
        });
        None
    }
}

impl Phase for Retrieval {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Retrieval
    }

    fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    fn start(&mut self, ctx: &mut PhaseContext<'_>) {
        self.current = None;
        self.revealed = false;
        self.gate.arm(ctx);
    }

    fn on_input(&mut self, input: Input, ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if !self.gate.is_open() {
            return None;
        }
        match input {
            Input::Enter => self.reveal(ctx),
            Input::Space => self.advance(ctx),
        }
    }

    fn on_timer(&mut self, timer: PhaseTimer, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        if timer == PhaseTimer::Activate {
            self.gate.open();
        }
        None
    }

    fn on_countdown_expired(&mut self, _ctx: &mut PhaseContext<'_>) -> Option<PhaseOutcome> {
        self.gate.is_open().then_some(PhaseOutcome::Completed)
    }

    fn cleanup(&mut self, ctx: &mut PhaseContext<'_>) {
        self.gate.close(ctx);
    }
}
