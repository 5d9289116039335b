use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "paygen")]
#[command(about = "Wait for release signing and generate update payloads per channel")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (default: .paygen/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the paygen stage for one build
    Run {
        #[arg(short, long)]
        board: String,

        #[arg(short, long)]
        version: String,

        /// JSON file of channel to signer instruction URLs, or `null`
        #[arg(short, long, required_unless_present = "channel")]
        instructions: Option<PathBuf>,

        /// Generate for these channels without waiting for signing
        #[arg(long = "channel")]
        channel: Vec<String>,

        #[arg(long)]
        debug: bool,

        #[arg(long)]
        skip_tests: bool,

        #[arg(long)]
        skip_delta: bool,
    },

    /// Run one signer evaluation cycle and print each channel's phase
    Check {
        #[arg(short, long)]
        instructions: PathBuf,
    },

    /// List error codes with descriptions and fixes
    Codes,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
