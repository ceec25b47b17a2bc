//! Midigen CLI - Command Line Interface for Midigen
//!
//! Generates MIDI event sequences under the event grammar, and converts
//! between scores and token rows.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

mod commands;
mod config;
mod utils;

use commands::{
    config::ConfigCommand, detokenize::DetokenizeCommand, generate::GenerateCommand,
    tokenize::TokenizeCommand, vocab::VocabCommand, Command,
};

#[derive(Parser)]
#[command(
    name = "midigen",
    version = env!("CARGO_PKG_VERSION"),
    about = "Grammar-constrained MIDI event generation",
    long_about = "Generate MIDI event sequences one row at a time under the event grammar, inspect the vocabulary, and convert between scores and token rows."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MIDIGEN_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sequence and write it as a score
    #[command(name = "generate", alias = "gen", alias = "g")]
    Generate(GenerateCommand),

    /// Display the event vocabulary
    #[command(name = "vocab", alias = "v")]
    Vocab(VocabCommand),

    /// Convert a score into token rows
    #[command(name = "tokenize")]
    Tokenize(TokenizeCommand),

    /// Convert token rows into a score
    #[command(name = "detokenize")]
    Detokenize(DetokenizeCommand),

    /// Show or initialize the configuration file
    #[command(name = "config")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli)?;

    debug!("Midigen CLI v{} starting", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    debug!("Configuration loaded: {:?}", config);

    // Execute command
    let result = match &cli.command {
        Commands::Generate(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Vocab(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Tokenize(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Detokenize(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Config(cmd) => cmd.execute(&config, cli.json).await,
    };

    match result {
        Ok(_) => {
            if !cli.quiet {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    // RUST_LOG takes precedence over the flags
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
