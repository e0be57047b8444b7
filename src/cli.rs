use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{WatchFallback, WatchMode};

#[derive(Debug, Clone, Parser)]
#[command(name = "javadoc-store")]
#[command(about = "Look up Java class documentation in a directory of javadoc archives")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[arg(long, value_name = "EXT", value_delimiter = ',')]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Resolve a name and print its documentation.
    Show {
        class_name: String,

        #[arg(long)]
        framed: bool,
    },
    Resolve {
        class_name: String,
    },
    Search {
        query: String,

        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<usize>,
    },
    Archives,
    /// Keep the index live and answer one name per stdin line.
    Serve {
        #[arg(long, value_enum, default_value_t = WatchMode::Notify)]
        watch: WatchMode,

        #[arg(long, value_enum, default_value_t = WatchFallback::Poll)]
        fallback: WatchFallback,

        #[arg(long, value_name = "MS", default_value_t = 150)]
        debounce_ms: u64,

        #[arg(long, value_name = "MS", default_value_t = 2000)]
        poll_ms: u64,

        #[arg(long)]
        framed: bool,
    },
}
