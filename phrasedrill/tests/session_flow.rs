use phrasedrill::common::{Batch, Level, PhraseId, TextId};
use phrasedrill::components::bus::EventBus;
use phrasedrill::config::DrillConfig;
use phrasedrill::corpus::Corpus;
use phrasedrill::engine::{ChallengeManager, SessionState};
use phrasedrill::events::{DrillEvent, Input, Stimulus, TemplatePath, TimerCommand, ViewEvent};
use phrasedrill::phases::PhaseKind;
use phrasedrill::planner::plan_batches;
use phrasedrill::progress::{MasteryLevel, ProgressDocument, UserProgress};
use phrasedrill::storage::MemoryStorage;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Drives a manager the way a host would: acknowledges every template and
/// waits out each grace period.
struct Drill {
    manager: ChallengeManager,
    events: Arc<Mutex<Vec<DrillEvent>>>,
    storage: MemoryStorage,
}

impl Drill {
    fn start(counts: &[usize]) -> Self {
        Self::prepared(counts, DrillConfig::default(), |_, _| {})
    }

    fn prepared(
        counts: &[usize],
        config: DrillConfig,
        prepare: impl FnOnce(&mut UserProgress, &Corpus),
    ) -> Self {
        let storage = MemoryStorage::new();
        let bus = EventBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let corpus = Corpus::synthetic("test", counts);
        let mut progress = UserProgress::new(storage.clone(), bus.clone());
        progress.load().unwrap();
        prepare(&mut progress, &corpus);

        let mut manager = ChallengeManager::new(config, progress, bus).with_seed(11);
        manager.handle(Stimulus::CorpusLoaded(corpus));
        manager.handle(Stimulus::ProgressReady);
        Self {
            manager,
            events,
            storage,
        }
    }

    fn settle(&mut self) {
        if let Some(template) = self.manager.pending_template() {
            self.manager.handle(Stimulus::TemplateLoaded(template));
            self.manager.handle(Stimulus::Elapsed(Duration::from_millis(100)));
        }
    }

    fn press(&mut self, input: Input) {
        self.manager.handle(Stimulus::Input(input));
        self.settle();
    }

    fn wait(&mut self, millis: u64) {
        self.manager.handle(Stimulus::Elapsed(Duration::from_millis(millis)));
        self.settle();
    }

    fn cont(&mut self) {
        self.manager.handle(Stimulus::Continue);
        self.settle();
    }

    fn expire(&mut self) {
        self.manager.handle(Stimulus::TimerExpired);
        self.settle();
    }

    fn mark(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn since(&self, mark: usize) -> Vec<DrillEvent> {
        self.events.lock().unwrap()[mark..].to_vec()
    }

    fn timer_since(&self, mark: usize) -> Vec<TimerCommand> {
        self.since(mark)
            .into_iter()
            .filter_map(|e| match e {
                DrillEvent::Timer(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn phases_since(&self, mark: usize) -> Vec<PhaseKind> {
        self.since(mark)
            .into_iter()
            .filter_map(|e| match e {
                DrillEvent::PhaseStarted { phase, .. } => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn last_choices(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|e| match e {
                DrillEvent::View(ViewEvent::ShowChoices { options }) => Some(options.clone()),
                _ => None,
            })
            .expect("no choices shown yet")
    }

    fn current_highlight(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|e| match e {
                DrillEvent::View(ViewEvent::Highlight { index }) => Some(*index),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Moves the highlight onto the right (or a wrong) option and submits it.
    fn answer(&mut self, correct: bool) {
        assert_eq!(self.manager.current_phase(), Some(PhaseKind::Solution));
        let options = self.last_choices();
        let phrase = self.manager.current_phrase_id().unwrap();
        let primary = format!("translation {phrase}");
        let right = options.iter().position(|o| *o == primary).unwrap();
        let target = if correct { right } else { (right + 1) % options.len() };
        let presses = (target + options.len() - self.current_highlight()) % options.len();
        for _ in 0..presses {
            self.press(Input::Space);
        }
        self.press(Input::Enter);
    }

    /// Presentation -> Solution, answered right first time.
    fn play_skipping(&mut self) {
        self.press(Input::Enter);
        self.answer(true);
        self.wait(1000);
    }

    /// Presentation -> revision phase through both units -> ReadyOrNot ->
    /// Solution, answered right.
    fn play_revising(&mut self) {
        self.press(Input::Space);
        for _ in 0..3 {
            self.press(Input::Space);
        }
        self.press(Input::Enter);
        self.answer(true);
        self.wait(1000);
    }

    fn mastered(&self, id: &str) -> bool {
        self.manager.progress().is_phrase_mastered(&PhraseId::from(id))
    }
}

#[test]
fn startup_waits_for_both_preconditions_in_either_order() {
    for corpus_first in [true, false] {
        let bus = EventBus::new();
        let mut progress = UserProgress::new(MemoryStorage::new(), bus.clone());
        progress.load().unwrap();
        let mut manager = ChallengeManager::new(DrillConfig::default(), progress, bus);
        let corpus = Corpus::synthetic("test", &[4, 5, 3]);

        if corpus_first {
            manager.handle(Stimulus::CorpusLoaded(corpus));
            assert_eq!(manager.state(), SessionState::Starting);
            manager.handle(Stimulus::ProgressReady);
        } else {
            manager.handle(Stimulus::ProgressReady);
            assert_eq!(manager.state(), SessionState::Starting);
            manager.handle(Stimulus::CorpusLoaded(corpus));
        }
        assert_eq!(manager.state(), SessionState::AwaitingCover);
        assert_eq!(manager.plan(), &[Batch::new(vec![1, 2]), Batch::new(vec![3])]);
        assert_eq!(manager.progress().document().unwrap().games_played, 1);
    }
}

#[test]
fn readiness_signal_before_the_store_loads_is_deferred() {
    let bus = EventBus::new();
    let progress = UserProgress::new(MemoryStorage::new(), bus.clone());
    let mut manager = ChallengeManager::new(DrillConfig::default(), progress, bus);
    manager.handle(Stimulus::CorpusLoaded(Corpus::synthetic("test", &[3])));
    manager.handle(Stimulus::ProgressReady);
    assert_eq!(manager.state(), SessionState::Starting);

    manager.progress_mut().load().unwrap();
    manager.handle(Stimulus::ProgressReady);
    assert_eq!(manager.state(), SessionState::AwaitingCover);
}

#[test]
fn text_cover_waits_for_continue() {
    let mut drill = Drill::start(&[3]);
    assert!(drill.since(0).iter().any(|e| *e
        == DrillEvent::TextCover {
            text: TextId::new("t1"),
            level: Level::One
        }));
    assert_eq!(drill.manager.challenges_created(), 0);

    drill.cont();
    assert_eq!(drill.manager.challenges_created(), 1);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Presentation));
    assert!(drill.manager.phase_is_active());
}

#[test]
fn level_one_recipe_starts_the_timer_once_at_solution() {
    let mut drill = Drill::start(&[3]);
    let mark = drill.mark();
    drill.cont();
    drill.press(Input::Space);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Revision));
    for _ in 0..3 {
        drill.press(Input::Space);
    }
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::ReadyOrNot));
    assert_eq!(drill.timer_since(mark), vec![TimerCommand::Reset]);

    drill.press(Input::Enter);
    assert_eq!(
        drill.phases_since(mark),
        vec![
            PhaseKind::Presentation,
            PhaseKind::Revision,
            PhaseKind::ReadyOrNot,
            PhaseKind::Solution
        ]
    );
    assert_eq!(drill.timer_since(mark), vec![TimerCommand::Reset, TimerCommand::Start]);

    drill.answer(true);
    drill.wait(1000);
    assert_eq!(
        drill.timer_since(mark)[..3],
        [TimerCommand::Reset, TimerCommand::Start, TimerCommand::Stop]
    );
}

#[test]
fn level_one_return_to_revision_does_not_restart_the_timer_early() {
    let mut drill = Drill::start(&[3]);
    let mark = drill.mark();
    drill.cont();
    drill.press(Input::Space);
    for _ in 0..3 {
        drill.press(Input::Space);
    }
    // Not ready yet: back to revision.
    drill.press(Input::Space);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Revision));
    for _ in 0..3 {
        drill.press(Input::Space);
    }
    drill.press(Input::Enter);
    assert_eq!(drill.timer_since(mark), vec![TimerCommand::Reset, TimerCommand::Start]);
}

fn start_at_level_two(counts: &[usize]) -> Drill {
    Drill::prepared(counts, DrillConfig::default(), |progress, corpus| {
        progress.register_corpus(corpus).unwrap();
        let plan = plan_batches(&corpus.phrase_counts(), &DrillConfig::default().batching);
        let first = plan[0].clone();
        progress.set_batch_structure(plan).unwrap();
        progress.update_current_position(first, Level::Two).unwrap();
    })
}

#[test]
fn level_two_pauses_between_retrieval_and_solution() {
    let mut drill = start_at_level_two(&[3]);
    let mark = drill.mark();
    drill.cont();
    drill.press(Input::Space);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Retrieval));
    assert_eq!(drill.timer_since(mark), vec![TimerCommand::Reset, TimerCommand::Start]);

    drill.press(Input::Space);
    drill.press(Input::Enter);
    drill.press(Input::Space);
    drill.press(Input::Space);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::ReadyOrNot));

    drill.press(Input::Enter);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Solution));
    assert_eq!(
        drill.timer_since(mark),
        vec![
            TimerCommand::Reset,
            TimerCommand::Start,
            TimerCommand::Pause,
            TimerCommand::Resume
        ]
    );

    let revealed: Vec<_> = drill
        .since(mark)
        .into_iter()
        .filter(|e| matches!(e, DrillEvent::TranslationRevealed { unit: 0, .. }))
        .collect();
    assert_eq!(revealed.len(), 1);

    drill.answer(true);
    drill.wait(1000);
    let attempt = &drill
        .manager
        .progress()
        .phrase_progress(&PhraseId::from("t1_p1"))
        .unwrap()
        .attempts[0];
    assert!(attempt.peeked);
    assert!(attempt.peeked_units.contains(&0));
}

#[test]
fn level_two_skip_starts_the_timer_fresh_at_solution() {
    let mut drill = start_at_level_two(&[3]);
    let mark = drill.mark();
    drill.cont();
    drill.press(Input::Enter);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Solution));
    assert_eq!(drill.timer_since(mark), vec![TimerCommand::Reset, TimerCommand::Start]);
}

#[test]
fn skipping_and_answering_right_first_time_masters_the_phrase() {
    let mut drill = Drill::start(&[3]);
    drill.cont();
    let mark = drill.mark();
    drill.play_skipping();

    assert!(drill.mastered("t1_p1"));
    assert!(drill.since(mark).contains(&DrillEvent::AttemptRecorded {
        phrase: PhraseId::from("t1_p1"),
        played_level: Level::One,
        resulting_level: MasteryLevel::Mastered,
    }));
    // The next phrase follows straight away, without another cover.
    assert_eq!(drill.manager.current_phrase_id(), Some(PhraseId::from("t1_p2")));
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Presentation));
}

#[test]
fn answering_right_after_revision_does_not_master() {
    let mut drill = Drill::start(&[3]);
    drill.cont();
    drill.play_revising();
    assert!(!drill.mastered("t1_p1"));
    assert_eq!(drill.manager.challenges_created(), 2);
}

#[test]
fn wrong_answer_keeps_the_challenge_and_blocks_mastery() {
    let mut drill = Drill::start(&[3]);
    drill.cont();
    drill.press(Input::Enter);
    let mark = drill.mark();
    drill.answer(false);
    assert!(drill.since(mark).contains(&DrillEvent::WrongAnswer {
        phrase: PhraseId::from("t1_p1")
    }));
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Solution));

    drill.wait(1000);
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Solution));
    drill.answer(true);
    drill.wait(1000);

    assert!(!drill.mastered("t1_p1"));
    let attempts = &drill
        .manager
        .progress()
        .phrase_progress(&PhraseId::from("t1_p1"))
        .unwrap()
        .attempts;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].incorrect_count, 1);
    assert!(attempts[0].skipped && attempts[0].correct_answer);
}

#[test]
fn countdown_expiry_costs_a_life_and_moves_on_after_both_delays() {
    let mut drill = Drill::start(&[3]);
    drill.cont();
    drill.press(Input::Enter);
    let mark = drill.mark();

    drill.expire();
    drill.wait(1999);
    assert!(!drill.since(mark).contains(&DrillEvent::LifeLost));
    drill.wait(1);
    assert!(drill.since(mark).contains(&DrillEvent::LifeLost));
    assert_eq!(drill.manager.challenges_created(), 1);
    assert_eq!(drill.manager.current_phase(), None);

    // Input during the expiry feedback is ignored.
    drill.press(Input::Enter);
    drill.wait(999);
    assert_eq!(drill.manager.challenges_created(), 1);
    drill.wait(1);
    assert_eq!(drill.manager.challenges_created(), 2);
    assert_eq!(drill.manager.current_phrase_id(), Some(PhraseId::from("t1_p2")));

    let attempt = &drill
        .manager
        .progress()
        .phrase_progress(&PhraseId::from("t1_p1"))
        .unwrap()
        .attempts[0];
    assert!(!attempt.correct_answer);
    assert!(!drill.mastered("t1_p1"));
}

#[test]
fn text_mastered_fires_once_every_phrase_is_mastered() {
    let mut drill = Drill::start(&[2, 1]);
    drill.cont();
    let mark = drill.mark();
    drill.play_skipping();
    assert!(!drill
        .since(mark)
        .iter()
        .any(|e| matches!(e, DrillEvent::TextMastered(_))));

    drill.play_skipping();
    let mastered: Vec<_> = drill
        .since(mark)
        .into_iter()
        .filter(|e| matches!(e, DrillEvent::TextMastered(_)))
        .collect();
    assert_eq!(mastered, vec![DrillEvent::TextMastered(TextId::new("t1"))]);
}

#[test]
fn batches_advance_level_one_then_level_two_then_next_batch() {
    let mut config = DrillConfig::default();
    config.batching.min_phrases = 1;
    config.batching.max_phrases = 1;
    let mut drill = Drill::prepared(&[1, 1], config, |_, _| {});
    assert_eq!(drill.manager.plan(), &[Batch::new(vec![1]), Batch::new(vec![2])]);
    assert_eq!(drill.manager.cursor().unwrap().batch, Batch::new(vec![1]));

    // Batch [1] at level one, revising so the phrase survives to level two.
    drill.cont();
    let mark = drill.mark();
    drill.play_revising();
    assert!(drill.since(mark).contains(&DrillEvent::PositionChanged {
        batch: Batch::new(vec![1]),
        level: Level::Two
    }));
    assert_eq!(drill.manager.state(), SessionState::AwaitingCover);
    assert!(drill.manager.progress().is_text_complete(Level::One, 1));

    // Batch [1] at level two.
    drill.cont();
    assert_eq!(drill.manager.current_phase(), Some(PhaseKind::Presentation));
    let mark = drill.mark();
    drill.play_skipping();
    assert!(drill.since(mark).contains(&DrillEvent::PositionChanged {
        batch: Batch::new(vec![2]),
        level: Level::One
    }));
    let position = drill.manager.progress().resume_position();
    assert_eq!((position.batch, position.level), (Batch::new(vec![2]), Level::One));

    // Batch [2]: mastered at level one, so level two has nothing left.
    drill.cont();
    let mark = drill.mark();
    drill.play_skipping();
    let events = drill.since(mark);
    assert!(events.contains(&DrillEvent::PositionChanged {
        batch: Batch::new(vec![2]),
        level: Level::Two
    }));
    assert_eq!(events.last(), Some(&DrillEvent::ContentExhausted));
    assert_eq!(drill.manager.state(), SessionState::Exhausted);

    let document = drill.manager.progress().document().unwrap();
    assert!(document.sessions[0].ended_at.is_some());
    assert_eq!(document.sessions[0].phrases_attempted, 3);
}

#[test]
fn exhausted_session_creates_no_further_challenges() {
    let mut drill = Drill::start(&[1]);
    drill.cont();
    drill.play_skipping();
    assert_eq!(drill.manager.state(), SessionState::Exhausted);

    let created = drill.manager.challenges_created();
    let mark = drill.mark();
    drill.cont();
    drill.press(Input::Enter);
    drill.expire();
    drill.manager.handle(Stimulus::TemplateLoaded(TemplatePath::Presentation));
    drill.wait(10_000);
    drill.manager.handle(Stimulus::ProgressReady);

    assert_eq!(drill.manager.challenges_created(), created);
    assert!(drill.since(mark).is_empty());
}

#[test]
fn resume_position_places_the_cursor_and_skips_completed_texts() {
    let drill = Drill::prepared(&[4, 5, 3, 3], DrillConfig::default(), |progress, corpus| {
        progress.register_corpus(corpus).unwrap();
        let plan = plan_batches(&corpus.phrase_counts(), &DrillConfig::default().batching);
        assert_eq!(plan, vec![Batch::new(vec![1, 2]), Batch::new(vec![3, 4])]);
        progress.set_batch_structure(plan).unwrap();
        progress
            .update_current_position(Batch::new(vec![3, 4]), Level::Two)
            .unwrap();
        progress.mark_text_complete(Level::Two, 3).unwrap();
    });

    let cursor = drill.manager.cursor().unwrap();
    assert_eq!(cursor.batch, Batch::new(vec![3, 4]));
    assert_eq!(cursor.level, Level::Two);
    assert_eq!((cursor.text_index, cursor.phrase_index), (3, 0));
    assert!(drill.since(0).contains(&DrillEvent::TextCover {
        text: TextId::new("t4"),
        level: Level::Two
    }));
}

#[test]
fn session_keeps_going_when_progress_cannot_be_persisted() {
    let mut drill = Drill::start(&[3]);
    drill.cont();
    drill.storage.fail_next_writes(u32::MAX);
    drill.play_skipping();

    assert!(drill.mastered("t1_p1"));
    assert_eq!(drill.manager.challenges_created(), 2);

    let stored: ProgressDocument =
        serde_json::from_str(&drill.storage.contents().unwrap()).unwrap();
    assert_eq!(
        stored.phrase_progress[&PhraseId::from("t1_p1")].level,
        MasteryLevel::One
    );
}
