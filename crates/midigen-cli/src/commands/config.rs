//! Configuration display and initialization command

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use crate::commands::Command;
use crate::config::{expand_path, Config};
use crate::utils::{print_success, write_json};

#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Write the effective configuration to a file
    #[arg(long)]
    pub init: bool,

    /// Target file for --init (defaults to the user config location)
    #[arg(long, requires = "init")]
    pub path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing config command: {:?}", self);

        if !self.init {
            if json_output {
                return write_json(config, None);
            }
            let content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            print!("{}", content);
            return Ok(());
        }

        let path = match &self.path {
            Some(path) => expand_path(path)?,
            None => Config::default_config_path(),
        };
        if path.exists() && !self.force {
            anyhow::bail!(
                "Config file already exists: {}\n\
                Suggestion: Pass --force to overwrite it",
                path.display()
            );
        }

        config.save(&path)?;
        print_success(&format!("Configuration written to {}", path.display()));
        Ok(())
    }
}
