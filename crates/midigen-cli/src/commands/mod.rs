//! Command implementations for Midigen CLI

pub mod config;
pub mod detokenize;
pub mod generate;
pub mod tokenize;
pub mod vocab;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for CLI command execution
#[async_trait]
pub trait Command {
    /// Execute the command
    async fn execute(&self, config: &crate::config::Config, json_output: bool) -> Result<()>;
}
