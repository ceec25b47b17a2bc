//! Vocabulary inspection command

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use midigen_core::prelude::*;
use serde_json::{json, Value};
use tracing::debug;

use crate::commands::Command;
use crate::config::Config;
use crate::utils::{describe_symbol, print_output};

#[derive(Args, Debug)]
pub struct VocabCommand {
    /// Describe these symbols instead of listing the vocabulary
    #[arg(short, long = "symbol", value_name = "ID")]
    pub symbols: Vec<Symbol>,
}

#[async_trait]
impl Command for VocabCommand {
    async fn execute(&self, _config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing vocab command: {:?}", self);

        let registry = Registry::<MidiEvent>::new()?;
        let output = if self.symbols.is_empty() {
            vocabulary_summary(&registry)
        } else {
            let described: Vec<Value> = self
                .symbols
                .iter()
                .map(|&symbol| json!({ "symbol": symbol, "meaning": describe_symbol(&registry, symbol) }))
                .collect();
            json!({ "symbols": described })
        };

        print_output(&output, json_output)
    }
}

fn vocabulary_summary(registry: &Registry<MidiEvent>) -> Value {
    let events: Vec<Value> = registry
        .event_types()
        .iter()
        .map(|&event| {
            json!({
                "name": event.name(),
                "symbol": registry.event_symbol(event),
                "params": event.params().iter().map(|p| p.name()).collect::<Vec<_>>().join(" "),
            })
        })
        .collect();

    let params: Vec<Value> = MidiParam::ALL
        .iter()
        .filter_map(|&param| {
            let range = registry.value_range(param)?;
            Some(json!({
                "name": param.name(),
                "first_symbol": range.base,
                "count": range.count,
            }))
        })
        .collect();

    json!({
        "vocab_size": registry.vocab_size(),
        "row_width": registry.row_width(),
        "structural": {
            "pad": registry.pad_id(),
            "begin": registry.bos_id(),
            "end": registry.eos_id(),
        },
        "events": events,
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_shape() {
        let registry = Registry::<MidiEvent>::new().unwrap();
        let summary = vocabulary_summary(&registry);

        assert_eq!(summary["vocab_size"], 3239);
        assert_eq!(summary["row_width"], 8);
        assert_eq!(summary["events"].as_array().unwrap().len(), 4);
        assert_eq!(summary["events"][3]["name"], "set_tempo");
        assert_eq!(summary["params"][10]["count"], 256);
    }
}
