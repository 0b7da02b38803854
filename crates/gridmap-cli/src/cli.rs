use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

#[derive(Parser, Debug)]
#[command(name = "gridmap", author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.gridmap/config.toml
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Log at debug level unless GRIDMAP_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow calculation progress of scenarios
    Watch {
        /// Network id; defaults to `session.default_network_id`
        #[arg(long)]
        net: Option<String>,
        /// Scenarios to watch; all scenarios of the network when omitted
        #[arg(long = "scenario")]
        scenarios: Vec<String>,
    },
    /// Print connection warnings for a scenario plus extra requests
    Warnings {
        /// Network id; defaults to `session.default_network_id`
        #[arg(long)]
        net: Option<String>,
        /// Scenario whose headroom is checked against
        #[arg(long)]
        scenario: String,
        /// Additional connection requests to stage
        #[arg(long = "request")]
        requests: Vec<String>,
    },
    /// Flatten a JSON document into an inspector tree
    Tree {
        /// JSON file, or `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Print the tree as JSON instead of indented text
        #[arg(long)]
        json: bool,
    },
}
