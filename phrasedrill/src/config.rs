//! Defines all configuration structures for the drill engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, with `DRILL__*` environment variables
//! layered on top. Every field carries a default, so an empty or missing
//! file yields the stock game pacing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The top-level configuration for the `ChallengeManager`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrillConfig {
    /// Grace periods and feedback durations used by the phases.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Size policy handed to the batch planner.
    #[serde(default)]
    pub batching: BatchPolicy,

    /// Where the progress document lives.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Multiple-choice settings for the solution phase.
    #[serde(default)]
    pub choices: ChoiceConfig,
}

impl DrillConfig {
    /// Loads the configuration from an optional TOML file plus environment.
    ///
    /// A missing file is not an error. Nested keys are overridden with a
    /// double underscore, e.g. `DRILL__TIMING__ACTIVATION_GRACE_MS=50`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix("DRILL").separator("__"))
            .build()
            .context("Failed to assemble drill configuration")?
            .try_deserialize()
            .context("Failed to deserialize drill configuration")
    }
}

/// Real-world delays the engine waits on, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Delay between a phase starting and it accepting input.
    #[serde(default = "default_activation_grace_ms")]
    pub activation_grace_ms: u64,
    /// How long correct/incorrect feedback stays visible in the solution phase.
    #[serde(default = "default_answer_feedback_ms")]
    pub answer_feedback_ms: u64,
    /// How long the timeout overlay stays up after the countdown expires.
    #[serde(default = "default_timeout_overlay_ms")]
    pub timeout_overlay_ms: u64,
    /// Extra pause after a timeout before the next challenge is created.
    #[serde(default = "default_expiry_feedback_ms")]
    pub expiry_feedback_ms: u64,
}

impl TimingConfig {
    pub fn activation_grace(&self) -> Duration {
        Duration::from_millis(self.activation_grace_ms)
    }

    pub fn answer_feedback(&self) -> Duration {
        Duration::from_millis(self.answer_feedback_ms)
    }

    pub fn timeout_overlay(&self) -> Duration {
        Duration::from_millis(self.timeout_overlay_ms)
    }

    pub fn expiry_feedback(&self) -> Duration {
        Duration::from_millis(self.expiry_feedback_ms)
    }
}

/// Phrase-count bounds for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchPolicy {
    #[serde(default = "default_min_phrases")]
    pub min_phrases: usize,
    #[serde(default = "default_max_phrases")]
    pub max_phrases: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceConfig {
    /// Upper bound on distractors mixed into the option set.
    #[serde(default = "default_max_distractors")]
    pub max_distractors: usize,
}

// --- Default value functions for serde ---

fn default_activation_grace_ms() -> u64 {
    100
}

fn default_answer_feedback_ms() -> u64 {
    1000
}

fn default_timeout_overlay_ms() -> u64 {
    2000
}

fn default_expiry_feedback_ms() -> u64 {
    1000
}

fn default_min_phrases() -> usize {
    6
}

fn default_max_phrases() -> usize {
    10
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("drill_progress.json")
}

fn default_max_distractors() -> usize {
    3
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            activation_grace_ms: default_activation_grace_ms(),
            answer_feedback_ms: default_answer_feedback_ms(),
            timeout_overlay_ms: default_timeout_overlay_ms(),
            expiry_feedback_ms: default_expiry_feedback_ms(),
        }
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            min_phrases: default_min_phrases(),
            max_phrases: default_max_phrases(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            progress_path: default_progress_path(),
        }
    }
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self {
            max_distractors: default_max_distractors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = DrillConfig::load(Some(Path::new("/nonexistent/drill.toml"))).unwrap();
        assert_eq!(config.timing.activation_grace_ms, 100);
        assert_eq!(config.batching, BatchPolicy { min_phrases: 6, max_phrases: 10 });
        assert_eq!(config.choices.max_distractors, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[timing]\nanswer_feedback_ms = 250\n\n[batching]\nmax_phrases = 12").unwrap();

        let config = DrillConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.timing.answer_feedback(), Duration::from_millis(250));
        assert_eq!(config.timing.timeout_overlay_ms, 2000);
        assert_eq!(config.batching.max_phrases, 12);
        assert_eq!(config.batching.min_phrases, 6);
    }
}
