use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "galaxy-nav")]
#[command(version, about = "Navigate pilots through a galaxy of connected star systems")]
pub struct Cli {
    /// World database path (defaults to the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty world database
    Init,

    /// Import a world from a directory of JSONL files
    Import {
        /// Directory holding one JSONL file per table (systems.jsonl, pilots.jsonl, ...)
        input_dir: PathBuf,
    },

    /// List every system with its connections and wormhole sector
    Systems,

    /// Show a pilot's position
    Pilot { username: String },

    /// Move a pilot to another sector of its current system
    Move {
        username: String,

        /// Target sector number
        sector: i64,
    },

    /// Warp a pilot to a connected system
    Warp {
        username: String,

        /// Target system id
        system: i64,
    },

    /// Run one request through the router, e.g. `request POST /warp --body '{...}'`
    Request {
        method: String,
        path: String,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Report world data the engine would reject
    Check,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
