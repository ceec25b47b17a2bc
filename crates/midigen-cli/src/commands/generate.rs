//! Generation command
//!
//! The decoder runs on a blocking worker and hands every completed row to
//! the async side over a channel. Ctrl-C stops the worker between rows; the
//! rows committed so far are still finalized and written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use console::style;
use indicatif::ProgressBar;
use midigen_core::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::config::{expand_path, Config};
use crate::utils::{create_progress_bar, format_duration, print_output, print_success, write_json};

#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Score JSON to continue from
    #[arg(short, long, conflicts_with = "instruments")]
    pub prompt: Option<PathBuf>,

    /// Number of rows taken from the prompt score, begin row included
    #[arg(long, default_value = "128")]
    pub prompt_events: usize,

    /// Instrument for the opening, as a General MIDI name or patch number (repeatable)
    #[arg(short, long = "instrument", value_name = "PATCH")]
    pub instruments: Vec<String>,

    /// Generation settings TOML replacing the [generation] section of the config
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Maximum number of rows to generate
    #[arg(short = 'n', long)]
    pub max_rows: Option<usize>,

    /// Temperature for sampling
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling threshold
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Top-k sampling limit
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Random seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pseudo-count of the histogram scorer
    #[arg(long, default_value = "1.0")]
    pub smoothing: f32,

    /// Output score JSON
    #[arg(short, long, default_value = "output.json")]
    pub output: PathBuf,

    /// Also write the raw rows as JSON
    #[arg(long)]
    pub rows_output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// What the blocking worker hands back
struct WorkerOutcome {
    rows: Vec<Row>,
    prompt_len: usize,
    finish: Option<FinishReason>,
    stats: GenerationStats,
    error: Option<CoreError>,
}

#[async_trait]
impl Command for GenerateCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing generate command: {:?}", self);

        // Validate arguments first
        self.validate_arguments()
            .context("Command validation failed")?;

        let registry = Arc::new(Registry::<MidiEvent>::new()?);
        let prompt = self.build_prompt(&registry, config.generation.max_prompt_rows)?;
        let generation = self.generation_config(config)?;
        info!(
            "Generating up to {} rows from a {}-row prompt",
            generation.max_rows,
            prompt.len()
        );

        let progress = if self.no_progress || json_output {
            ProgressBar::hidden()
        } else {
            create_progress_bar(generation.max_rows as u64, "")
        };

        let (tx, mut rx) = mpsc::channel::<EmittedRow<MidiEvent>>(64);
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = tokio::task::spawn_blocking({
            let registry = Arc::clone(&registry);
            let cancelled = Arc::clone(&cancelled);
            let generation = generation.clone();
            let smoothing = self.smoothing;
            move || run_worker(&registry, &generation, prompt, smoothing, &cancelled, tx)
        });

        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut listening = true;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(emitted) => {
                        progress.inc(1);
                        progress.set_message(format!(
                            "{} at beat {}",
                            emitted.event.kind.name(),
                            emitted.time / 16
                        ));
                    }
                    None => break,
                },
                signal = &mut interrupt, if listening => {
                    listening = false;
                    match signal {
                        Ok(()) => {
                            warn!("Interrupted, stopping after the current row");
                            cancelled.store(true, Ordering::SeqCst);
                            rx.close();
                        }
                        Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
                    }
                }
            }
        }
        progress.finish_and_clear();

        let outcome = worker.await.context("Generation worker panicked")?;
        let interrupted = cancelled.load(Ordering::SeqCst);
        self.write_results(config, &registry, &outcome, interrupted, json_output)?;

        match outcome.error {
            Some(err) => Err(anyhow::Error::new(err)
                .context("Generation stopped early; the rows committed before the failure were written")),
            None => Ok(()),
        }
    }
}

impl GenerateCommand {
    /// Validate command arguments and parameters
    fn validate_arguments(&self) -> Result<()> {
        if self.prompt_events == 0 {
            anyhow::bail!(
                "prompt-events must be greater than 0\n\
                Suggestion: Use 1 to start from the begin row only"
            );
        }

        if !(self.smoothing.is_finite() && self.smoothing > 0.0) {
            anyhow::bail!(
                "smoothing must be a positive number (got: {})\n\
                Suggestion: Use 1.0, or smaller values to follow the prompt more closely",
                self.smoothing
            );
        }

        if let Some(prompt) = &self.prompt {
            if prompt.extension().and_then(|e| e.to_str()) != Some("json") {
                anyhow::bail!(
                    "Prompt must be a score JSON file (got: {})\n\
                    Suggestion: Convert MIDI files to score JSON first",
                    prompt.display()
                );
            }
        }

        Ok(())
    }

    /// Configuration file values overridden by flags
    fn generation_config(&self, config: &Config) -> Result<GenerationConfig> {
        let mut generation = match &self.settings {
            Some(path) => {
                let path = expand_path(path)?;
                GenerationConfig::from_toml_file(&path)
                    .with_context(|| format!("Failed to load generation settings: {}", path.display()))?
            }
            None => config.generation.clone(),
        };
        if let Some(max_rows) = self.max_rows {
            generation.max_rows = max_rows;
        }
        if let Some(temperature) = self.temperature {
            generation.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            generation.top_p = top_p;
        }
        if let Some(top_k) = self.top_k {
            generation.top_k = top_k;
        }
        if self.seed.is_some() {
            generation.seed = self.seed;
        }
        if !self.instruments.is_empty() {
            generation.allow_patch_change = false;
        }

        generation.validate()?;
        Ok(generation)
    }

    fn build_prompt(&self, registry: &Registry<MidiEvent>, max_prompt_rows: usize) -> Result<Vec<Row>> {
        if let Some(path) = &self.prompt {
            let path = expand_path(path)?;
            let score = Score::from_json_file(&path)
                .with_context(|| format!("Failed to load prompt score: {}", path.display()))?;
            let limit = self.prompt_events.min(max_prompt_rows);
            return Ok(score_prompt(registry, &score, limit)?);
        }

        let patches = self
            .instruments
            .iter()
            .map(|name| {
                patch_from_name(name).with_context(|| {
                    format!(
                        "Unknown instrument '{}'\n\
                        Suggestion: Use a General MIDI program name such as 'Acoustic Grand' or a patch number 0-127",
                        name
                    )
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(instrument_prompt(registry, &patches)?)
    }

    fn write_results(
        &self,
        config: &Config,
        registry: &Registry<MidiEvent>,
        outcome: &WorkerOutcome,
        interrupted: bool,
        json_output: bool,
    ) -> Result<()> {
        let output = config.output_path(&self.output)?;
        let score = detokenize(registry, &outcome.rows);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        score
            .to_json_file(&output)
            .with_context(|| format!("Failed to write score: {}", output.display()))?;

        let rows_output = match &self.rows_output {
            Some(path) => Some(config.output_path(path)?),
            None if config.output.write_rows => Some(output.with_extension("rows.json")),
            None => None,
        };
        if let Some(path) = &rows_output {
            write_json(&outcome.rows, Some(path))?;
        }

        let finish_reason = match (interrupted, outcome.finish) {
            (true, _) => "cancelled".to_string(),
            (false, Some(reason)) => reason.to_string(),
            (false, None) => "unknown".to_string(),
        };

        if json_output {
            print_output(
                &json!({
                    "output": output.to_string_lossy(),
                    "rows_output": rows_output.as_deref().map(Path::to_string_lossy),
                    "prompt_rows": outcome.prompt_len,
                    "rows_generated": outcome.stats.rows_generated,
                    "score_events": score.event_count(),
                    "tracks": score.tracks.len(),
                    "finish_reason": finish_reason,
                    "history_scans": outcome.stats.history_scans,
                    "extensions": outcome.stats.extensions,
                    "elapsed_ms": outcome.stats.elapsed.as_millis(),
                    "rows_per_second": outcome.stats.rows_per_second(),
                }),
                true,
            )?;
        } else {
            print_success(&format!(
                "Generated {} rows in {} ({}), wrote {} events to {}",
                outcome.stats.rows_generated,
                format_duration(outcome.stats.elapsed),
                style(&finish_reason).cyan(),
                score.event_count(),
                output.display()
            ));
        }

        Ok(())
    }
}

/// Pull rows until the run ends, the receiver goes away, or Ctrl-C is seen
fn run_worker(
    registry: &Registry<MidiEvent>,
    config: &GenerationConfig,
    prompt: Vec<Row>,
    smoothing: f32,
    cancelled: &AtomicBool,
    tx: mpsc::Sender<EmittedRow<MidiEvent>>,
) -> WorkerOutcome {
    let oracle = HistogramOracle::new(registry.vocab_size()).with_smoothing(smoothing);
    let mut generator = match Generator::with_prompt(registry, oracle, config, prompt) {
        Ok(generator) => generator,
        Err(err) => {
            return WorkerOutcome {
                rows: Vec::new(),
                prompt_len: 0,
                finish: Some(FinishReason::Error),
                stats: GenerationStats::default(),
                error: Some(err),
            }
        }
    };

    let mut error = None;
    while !cancelled.load(Ordering::SeqCst) {
        match generator.next() {
            Some(Ok(emitted)) => {
                if tx.blocking_send(emitted).is_err() {
                    debug!("Row receiver closed, stopping generation");
                    break;
                }
            }
            Some(Err(err)) => {
                error = Some(err);
                break;
            }
            None => break,
        }
    }

    WorkerOutcome {
        prompt_len: generator.prompt_len(),
        finish: generator.finish_reason(),
        stats: generator.stats().clone(),
        rows: generator.into_rows(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        cmd: GenerateCommand,
    }

    fn parse(args: &[&str]) -> GenerateCommand {
        let mut argv = vec!["generate"];
        argv.extend_from_slice(args);
        Harness::parse_from(argv).cmd
    }

    #[test]
    fn test_flags_override_config() {
        let cmd = parse(&["-n", "32", "--top-k", "4", "--seed", "9", "-i", "violin"]);
        let generation = cmd.generation_config(&Config::default()).unwrap();

        assert_eq!(generation.max_rows, 32);
        assert_eq!(generation.top_k, 4);
        assert_eq!(generation.seed, Some(9));
        assert_eq!(generation.top_p, 0.98);
        assert!(!generation.allow_patch_change);
    }

    #[test]
    fn test_settings_file_replaces_config_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "max_rows = 7\ntop_k = 3\n").unwrap();

        let mut config = Config::default();
        config.generation.max_rows = 500;
        let settings = path.to_string_lossy().into_owned();
        let cmd = parse(&["--settings", &settings, "--top-k", "5"]);
        let generation = cmd.generation_config(&config).unwrap();

        assert_eq!(generation.max_rows, 7);
        assert_eq!(generation.top_k, 5);

        std::fs::write(&path, "temperature = -1.0\n").unwrap();
        assert!(cmd.generation_config(&config).is_err());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cmd = parse(&["--temperature", "0"]);
        assert!(cmd.generation_config(&Config::default()).is_err());
    }

    #[test]
    fn test_instrument_prompt_from_names() {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let cmd = parse(&["-i", "Acoustic Grand", "-i", "33"]);
        let rows = cmd.build_prompt(&registry, 128).unwrap();
        assert_eq!(rows.len(), 3);

        let cmd = parse(&["-i", "kazoo"]);
        assert!(cmd.build_prompt(&registry, 128).is_err());
    }

    #[test]
    fn test_worker_collects_rows() {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let prompt = instrument_prompt(&registry, &[0]).unwrap();
        let config = GenerationConfig {
            max_rows: 12,
            seed: Some(4),
            allow_patch_change: false,
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(64);
        let cancelled = AtomicBool::new(false);

        let outcome = run_worker(&registry, &config, prompt, 1.0, &cancelled, tx);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.prompt_len, 2);
        assert_eq!(outcome.rows.len(), outcome.prompt_len + outcome.stats.rows_generated);

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, outcome.stats.rows_generated);
    }

    #[test]
    fn test_worker_stops_when_cancelled() {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let cancelled = AtomicBool::new(true);

        let outcome = run_worker(&registry, &GenerationConfig::default(), Vec::new(), 1.0, &cancelled, tx);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.stats.rows_generated, 0);
        assert_eq!(outcome.finish, None);
    }
}
