//! CLI module for histmap-server
//!
//! Command-line interface parsing for the histmap-server binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// histmap-server - authentication and session backend for the historical
/// events map
#[derive(Parser, Debug)]
#[command(
    name = "histmap-server",
    version,
    about = "Historical events map backend: authentication and session lifecycle",
    long_about = "Serves the authentication and session API and runs the background\n\
                  peak-concurrency tracker and metrics sampler.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  histmap-server                          # Start the server (reads histmap.toml)\n    \
                  histmap-server --config prod.toml       # Use a custom config file\n    \
                  histmap-server purge-sessions           # Delete expired and ended sessions"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        default_value = "histmap.toml",
        env = "HISTMAP_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server and background tasks (default)
    Serve,

    /// Delete expired and ended sessions, then exit
    PurgeSessions {
        /// Also delete anonymous sessions idle for this many days
        #[arg(long)]
        anonymous_older_than_days: Option<u32>,
    },
}

impl Cli {
    /// The subcommand to run, defaulting to `serve`.
    pub fn resolved_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
