//! CLI module for the LLM cache
//!
//! Inspection subcommands over the configured stores:
//! - `key`: cache key of a request document
//! - `get`: stored exact entry for a key
//! - `lookup`: nearest semantic neighbor of a text
//! - `stats`: entry counts per tier

mod inspect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use inspect::run;

/// PMP LLM Cache - exact and semantic response caching for LLM calls
#[derive(Debug, Parser)]
#[command(name = "pmp-llm-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file layered over config/default and config/local
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the cache key of a JSON request document
    Key {
        /// File holding {"model", "messages", "extras"}
        #[arg(long)]
        request: PathBuf,
    },

    /// Print the exact-store entry for a key
    Get {
        /// 64-character hex cache key
        #[arg(long)]
        key: String,
    },

    /// Print the nearest semantic neighbor of a text
    Lookup {
        #[arg(long)]
        text: String,
    },

    /// Print entry counts of both tiers
    Stats,
}
