use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `tailmem` - durable event log, pointer compaction and recall indexes.
#[derive(Parser, Debug)]
#[command(name = "tailmem")]
#[command(version)]
#[command(about = "Inspect and rebuild agent memory stores.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Index session logs into the search database
    Index {
        /// Only this session (default: every session in the workspace)
        #[arg(long)]
        session: Option<String>,
    },

    /// Search indexed events
    Search {
        query: String,

        #[arg(long)]
        session: Option<String>,

        /// Event kind filter (repeatable), e.g. `tool_result`
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Role filter (repeatable): user, assistant, tool, system
        #[arg(long = "role")]
        roles: Vec<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Most recent indexed events of a session
    Recent {
        session: String,

        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Rebuild the concept index
    #[command(subcommand)]
    Rebuild(RebuildCommands),

    /// Show concept chunks filed under an anchor
    Lookup { anchor: String },

    /// Print the reflection digest for a day as JSON
    Digest {
        /// Day to summarize, YYYY-MM-DD (default: today, UTC)
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RebuildCommands {
    /// Incrementally index text files under a directory
    Fs { dir: PathBuf },

    /// Fold recent session events into the index
    Events {
        /// Trailing window in hours (default from config)
        #[arg(long)]
        hours: Option<u32>,
    },
}
