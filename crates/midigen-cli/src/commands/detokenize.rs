//! Rows to score conversion command

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use midigen_core::prelude::*;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use crate::commands::Command;
use crate::config::{expand_path, Config};
use crate::utils::{print_output, print_warning, read_json, write_json};

#[derive(Args, Debug)]
pub struct DetokenizeCommand {
    /// Rows JSON file
    pub input: PathBuf,

    /// Score JSON file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// List the decoded events with their absolute times
    #[arg(long)]
    pub events: bool,
}

#[async_trait]
impl Command for DetokenizeCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing detokenize command: {:?}", self);

        let input = expand_path(&self.input)?;
        let rows: Vec<Row> = read_json(&input)?;

        let registry = Registry::<MidiEvent>::new()?;
        let report = StreamFinalizer::new(&registry).finalize_report(&rows);
        if report.skipped > 0 {
            print_warning(&format!(
                "{} of {} rows could not be decoded and were skipped",
                report.skipped,
                rows.len()
            ));
        }

        if self.events {
            let listing: Vec<Value> = report
                .events
                .iter()
                .map(|timed| {
                    let mut entry = json!({
                        "time": timed.time,
                        "event": timed.event.kind.name(),
                    });
                    for (&param, &value) in timed.event.kind.params().iter().zip(&timed.event.values) {
                        entry[param.name()] = json!(value);
                    }
                    entry
                })
                .collect();
            print_output(&json!({ "events": listing }), json_output)?;
        }

        let score = detokenize(&registry, &rows);
        match &self.output {
            Some(output) => {
                let output = config.output_path(output)?;
                write_json(&score, Some(&output))?;
                if !self.events {
                    print_output(
                        &json!({
                            "input": input.to_string_lossy(),
                            "output": output.to_string_lossy(),
                            "rows": rows.len(),
                            "events": score.event_count(),
                            "tracks": score.tracks.len(),
                        }),
                        json_output,
                    )?;
                }
            }
            None if !self.events => write_json(&score, None)?,
            None => {}
        }

        Ok(())
    }
}
