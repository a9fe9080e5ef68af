use anyhow::{Context, Result};
use phrasedrill::prelude::*;
use phrasedrill::{ENGINE_NAME, VERSION};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SAMPLE_CORPUS: &str = include_str!("../data/sample_corpus.json");
const TICK: Duration = Duration::from_millis(50);
const COUNTDOWN: Duration = Duration::from_secs(12);

/// A stand-in for the external countdown device, driven by `Timer` events.
#[derive(Debug, Default)]
struct Countdown {
    remaining: Option<Duration>,
    running: bool,
}

impl Countdown {
    fn apply(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Start => {
                self.remaining = Some(COUNTDOWN);
                self.running = true;
            }
            TimerCommand::Resume => self.running = self.remaining.is_some(),
            TimerCommand::Pause => self.running = false,
            TimerCommand::Reset | TimerCommand::Stop => {
                self.remaining = None;
                self.running = false;
            }
        }
    }

    /// Returns `true` when the countdown ran out during `elapsed`.
    fn advance(&mut self, elapsed: Duration) -> bool {
        if !self.running {
            return false;
        }
        let Some(remaining) = self.remaining else {
            return false;
        };
        match remaining.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => {
                self.remaining = Some(left);
                false
            }
            _ => {
                self.remaining = None;
                self.running = false;
                true
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("{} v{} auto-play demo", ENGINE_NAME, VERSION);

    // 2. Load configuration and the corpus.
    let config = DrillConfig::load(Some(Path::new("drill.toml")))?;
    let corpus = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read corpus {}", path.display()))?;
            Corpus::from_json(&raw)?
        }
        None => Corpus::from_json(SAMPLE_CORPUS)?,
    };

    // 3. Wire the bus: log everything, forward everything to the host loop.
    let bus = EventBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<DrillEvent>();
    bus.subscribe_all(|event| {
        info!("[{:?}] => {:?}", event.topic(), event);
        Ok(())
    });
    bus.subscribe_all(move |event| {
        tx.send(event.clone())?;
        Ok(())
    });

    // 4. Build the progress store and the manager.
    let mut progress = UserProgress::new(
        FileStorage::new(config.storage.progress_path.clone()),
        bus.clone(),
    );
    progress.load()?;
    let mut manager = ChallengeManager::new(config, progress, bus);
    manager.handle(Stimulus::CorpusLoaded(corpus));
    manager.handle(Stimulus::ProgressReady);

    // 5. Drive it in real time until the content runs out or Ctrl+C.
    let mut countdown = Countdown::default();
    let mut ticker = tokio::time::interval(TICK);
    let mut last = Instant::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping the drill.");
                break;
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now - last;
                last = now;

                manager.handle(Stimulus::Elapsed(elapsed));
                if countdown.advance(elapsed) {
                    debug!("countdown expired");
                    manager.handle(Stimulus::TimerExpired);
                }
                while let Ok(event) = rx.try_recv() {
                    react(&mut manager, &mut countdown, event);
                }
                if manager.phase_is_active() && rand::thread_rng().gen_bool(0.1) {
                    let input = if rand::thread_rng().gen_bool(0.5) { Input::Enter } else { Input::Space };
                    manager.handle(Stimulus::Input(input));
                }
                if manager.state() == SessionState::Exhausted {
                    info!("Content exhausted after {} challenges.", manager.challenges_created());
                    break;
                }
            }
        }
    }

    if let Err(err) = manager.progress_mut().end_session() {
        warn!("Session end not persisted: {err}");
    }
    Ok(())
}

/// Plays the renderer and the countdown device for the events the engine emits.
fn react(manager: &mut ChallengeManager, countdown: &mut Countdown, event: DrillEvent) {
    match event {
        DrillEvent::LoadTemplate(path) => manager.handle(Stimulus::TemplateLoaded(path)),
        DrillEvent::TextCover { .. } => manager.handle(Stimulus::Continue),
        DrillEvent::Timer(command) => countdown.apply(command),
        _ => {}
    }
}
