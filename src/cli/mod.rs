//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lorestore",
    version,
    author = "neur0map",
    about = "Document ingestion and semantic search for story notes",
    long_about = "Lorestore splits notes, manuscripts and PDFs into structure-aware chunks, \
                  embeds them locally and answers top-k similarity queries from a snapshot \
                  kept on disk."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lorestore/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add documents to the index
    Ingest {
        /// Files to ingest (.txt, .md, .pdf; other files are read as text)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Source name for the path in the same position (repeatable)
        #[arg(short, long = "name", value_name = "NAME")]
        names: Vec<String>,

        /// Do not write the snapshot afterwards
        #[arg(long)]
        no_save: bool,

        /// Replace an existing snapshot that could not be loaded
        #[arg(short, long)]
        force: bool,
    },

    /// Search the index
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show only results from this source
        #[arg(short, long)]
        source: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the joined context block for a query
    Context {
        /// Query text
        query: String,

        /// Number of chunks to include (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show index status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
