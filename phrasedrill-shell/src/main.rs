use anyhow::Result;
use colored::Colorize;
use phrasedrill::planner::{plan_batches, validate_plan};
use phrasedrill::prelude::*;
use phrasedrill::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", ENGINE_NAME.cyan().bold());
    println!(
        "{}",
        format!(
            "          Shell   v{:<8} Library   v{:<8}",
            SHELL_VERSION, LIB_VERSION
        )
        .dimmed()
    );
    println!("{}", "-".repeat(60).dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  enter | e             - Presses Enter.");
    println!("  space | s             - Presses Space.");
    println!("  continue | c          - Dismisses the text cover.");
    println!("  expire                - Reports the countdown as expired.");
    println!("  wait <MS>             - Lets MS milliseconds pass.");
    println!("  status                - Shows the cursor and the running phase.");
    println!("  plan <C1> <C2> ...    - Plans batches for the given phrase counts.");
    println!("  progress              - Summarises the stored progress.");
    println!("  reset                 - Wipes all stored progress.");
    println!("  exit                  - Quits the shell.");
}

/// Prints engine events as they are published and keeps the ones the shell
/// has to answer (template loads) for after the command.
fn spawn_event_printer(bus: &EventBus, templates: Arc<Mutex<Vec<TemplatePath>>>) {
    bus.subscribe_all(move |event| {
        match event {
            DrillEvent::LoadTemplate(path) => {
                templates
                    .lock()
                    .map_err(|_| anyhow::anyhow!("template queue poisoned"))?
                    .push(*path);
                println!("{}", format!("<-- [TEMPLATE] {path}").dimmed());
            }
            DrillEvent::View(view) => println!("{}", format!("<-- [VIEW] {view:?}").blue()),
            DrillEvent::Timer(command) => println!("{}", format!("<-- [TIMER] {command:?}").magenta()),
            DrillEvent::TextCover { text, level } => println!(
                "{}",
                format!("<-- [COVER] text {text} at {level} (type 'continue')").cyan().bold()
            ),
            DrillEvent::WrongAnswer { .. } | DrillEvent::LifeLost => {
                println!("{}", format!("<-- {event:?}").red())
            }
            DrillEvent::TextMastered(_) | DrillEvent::ContentExhausted => {
                println!("{}", format!("<-- {event:?}").green().bold())
            }
            other => println!("<-- {other:?}"),
        }
        Ok(())
    });
}

fn print_status(manager: &ChallengeManager) {
    println!("State:   {:?}", manager.state());
    match manager.cursor() {
        Some(cursor) => println!(
            "Cursor:  batch {} at {}, text {}, phrase index {}",
            cursor.batch,
            cursor.level,
            cursor.text_number(),
            cursor.phrase_index
        ),
        None => println!("Cursor:  (not started)"),
    }
    let phase = manager
        .current_phase()
        .map(|p| format!("{p} ({})", if manager.phase_is_active() { "active" } else { "waiting" }))
        .unwrap_or_else(|| "none".to_string());
    println!("Phase:   {phase}");
    if let Some(id) = manager.current_phrase_id() {
        println!("Phrase:  {id}");
    }
    println!("Plan:    {:?}", manager.plan().iter().map(|b| b.to_string()).collect::<Vec<_>>());
    println!("Created: {} challenges, clock at {:?}", manager.challenges_created(), manager.now());
}

fn print_progress(manager: &ChallengeManager) {
    let Some(document) = manager.progress().document() else {
        println!("Progress store is not loaded.");
        return;
    };
    let mastered = document
        .phrase_progress
        .values()
        .filter(|p| p.level == MasteryLevel::Mastered)
        .count();
    let attempts: usize = document.phrase_progress.values().map(|p| p.attempts.len()).sum();
    println!("Games played:  {}", document.games_played);
    println!("Phrases:       {} ({} mastered)", document.phrase_progress.len(), mastered);
    println!("Attempts:      {attempts}");
    let position = manager.progress().resume_position();
    println!("Resume at:     batch {} {}", position.batch, position.level);
    for (label, map) in [
        ("Level 1 done:", &document.batch_completion_state.level1),
        ("Level 2 done:", &document.batch_completion_state.level2),
    ] {
        let done: Vec<_> = map.iter().filter(|(_, d)| **d).map(|(t, _)| *t).collect();
        println!("{label:<14} {done:?}");
    }
}

fn print_plan(args: &[&str]) {
    let counts: Result<Vec<usize>, _> = args.iter().map(|a| a.parse::<usize>()).collect();
    match counts {
        Ok(counts) if !counts.is_empty() && counts.iter().all(|c| *c > 0) => {
            let plan = plan_batches(&counts, &DrillConfig::default().batching);
            for batch in &plan {
                println!("  {} => {} phrases", batch, batch.total(&counts));
            }
            if let Err(err) = validate_plan(&counts, &plan) {
                println!("{}", format!("Plan failed validation: {err}").red());
            }
        }
        _ => println!("Usage: plan <COUNT> <COUNT> ... (positive numbers)"),
    }
}

/// Answers pending template loads the way a renderer would.
fn acknowledge_templates(manager: &mut ChallengeManager, templates: &Arc<Mutex<Vec<TemplatePath>>>) {
    loop {
        let next = match templates.lock() {
            Ok(mut queue) if !queue.is_empty() => Some(queue.remove(0)),
            _ => None,
        };
        let Some(path) = next else { break };
        manager.handle(Stimulus::TemplateLoaded(path));
    }
}

fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config = DrillConfig::load(Some(Path::new("drill.toml")))?;
    let corpus = match env::args().nth(1) {
        Some(path) => Corpus::from_json(&std::fs::read_to_string(&path)?)?,
        None => Corpus::synthetic("shell", &[4, 5, 3, 8]),
    };

    let bus = EventBus::new();
    let templates = Arc::new(Mutex::new(Vec::new()));
    spawn_event_printer(&bus, templates.clone());

    let mut progress = UserProgress::new(
        FileStorage::new(config.storage.progress_path.clone()),
        bus.clone(),
    );
    progress.load()?;
    info!("Loaded progress from {}", config.storage.progress_path.display());

    let mut manager = ChallengeManager::new(config, progress, bus);
    manager.handle(Stimulus::CorpusLoaded(corpus));
    manager.handle(Stimulus::ProgressReady);
    acknowledge_templates(&mut manager, &templates);

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    let mut last = Instant::now();
    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting drillshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;

        // Real time passes while the learner thinks.
        let now = Instant::now();
        manager.handle(Stimulus::Elapsed(now - last));
        last = now;

        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };
        match *command {
            "enter" | "e" => manager.handle(Stimulus::Input(Input::Enter)),
            "space" | "s" => manager.handle(Stimulus::Input(Input::Space)),
            "continue" | "c" => manager.handle(Stimulus::Continue),
            "expire" => manager.handle(Stimulus::TimerExpired),
            "wait" => match args.get(1).and_then(|ms| ms.parse::<u64>().ok()) {
                Some(ms) => manager.handle(Stimulus::Elapsed(Duration::from_millis(ms))),
                None => println!("Usage: wait <MILLISECONDS>"),
            },
            "status" => print_status(&manager),
            "plan" => print_plan(&args[1..]),
            "progress" => print_progress(&manager),
            "reset" => match manager.progress_mut().reset() {
                Ok(()) => println!("--> Progress wiped. Restart the shell to play from the beginning."),
                Err(err) => println!("{}", format!("Reset not persisted: {err}").red()),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
        acknowledge_templates(&mut manager, &templates);

        if manager.state() == SessionState::Exhausted {
            println!("{}", "All content done. Type 'exit' to quit.".green());
        }
    }

    Ok(())
}
