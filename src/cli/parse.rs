//! CLI parse: clap types for tileboard. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tileboard CLI - generate and deliver messages to a split-flap board
#[derive(Parser)]
#[command(name = "tileboard")]
#[command(about = "Generate, validate and deliver messages to a 6x22 split-flap board")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run,
    /// Run one major cycle now
    Send {
        /// Generator id to run instead of a random selection
        #[arg(long)]
        generator: Option<String>,
        /// Trigger event type; selects a matching notification generator
        #[arg(long, conflicts_with = "generator")]
        trigger: Option<String>,
        /// JSON payload for --trigger
        #[arg(long, requires = "trigger")]
        payload: Option<String>,
    },
    /// Validate text and show how it lands on the board
    Preview {
        /// Message text; use \n for line breaks
        text: String,
        /// Skip the clock frame and place text top-left
        #[arg(long)]
        no_frame: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Inspect and control circuits
    Circuits {
        #[command(subcommand)]
        command: CircuitCommands,
    },
    /// Check provider connections; success closes the provider's circuit
    Probe {
        /// Provider name from [providers]; all providers when omitted
        provider: Option<String>,
    },
    /// Show recent major-cycle attempts
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Validate the loaded configuration
    Validate,
}

#[derive(Subcommand)]
pub enum CircuitCommands {
    /// List circuit states
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Close a circuit and clear its failure count
    Reset { circuit_id: String },
    /// Flip a manual switch (MASTER_SWITCH, SLEEP_MODE)
    Set {
        circuit_id: String,
        position: SwitchArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SwitchArg {
    On,
    Off,
}
