//! Score to rows conversion command

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use midigen_core::prelude::*;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::commands::Command;
use crate::config::{expand_path, Config};
use crate::utils::{print_output, write_json};

#[derive(Args, Debug)]
pub struct TokenizeCommand {
    /// Score JSON file
    pub input: PathBuf,

    /// Rows JSON file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Leave out the begin and end rows
    #[arg(long)]
    pub no_markers: bool,
}

#[async_trait]
impl Command for TokenizeCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing tokenize command: {:?}", self);

        let input = expand_path(&self.input)?;
        let score = Score::from_json_file(&input)
            .with_context(|| format!("Failed to load score: {}", input.display()))?;

        let registry = Registry::<MidiEvent>::new()?;
        let rows = tokenize_score(&registry, &score, !self.no_markers)?;
        info!("Tokenized {} events into {} rows", score.event_count(), rows.len());

        match &self.output {
            Some(output) => {
                let output = config.output_path(output)?;
                write_json(&rows, Some(&output))?;
                print_output(
                    &json!({
                        "input": input.to_string_lossy(),
                        "output": output.to_string_lossy(),
                        "score_events": score.event_count(),
                        "rows": rows.len(),
                    }),
                    json_output,
                )?;
            }
            None => write_json(&rows, None)?,
        }

        Ok(())
    }
}
