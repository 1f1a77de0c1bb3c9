//! Command-line surface of `cereal`.
//!
//! Argument types live here; [`commands`] holds one function per subcommand.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod commands;
pub mod table;

#[derive(Parser, Debug)]
#[command(
    name = "cereal",
    version,
    about = "Command-line client for the Serialized event-sourcing API"
)]
pub struct Cli {
    /// Config file (default: ~/.config/cereal/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the API base URL from the config file
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a single event
    Store(StoreArgs),
    /// Inspect and delete aggregates
    #[command(subcommand)]
    Aggregate(AggregateCommand),
    /// Show and list feeds
    #[command(subcommand)]
    Feed(FeedCommand),
    /// Show projections and manage projection definitions
    #[command(subcommand)]
    Projection(ProjectionCommand),
    /// Manage reaction definitions
    #[command(subcommand)]
    Reaction(ReactionCommand),
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Aggregate type
    #[arg(long)]
    pub agg_type: String,
    /// Aggregate id (generated when omitted)
    #[arg(long)]
    pub agg_id: Option<String>,
    /// Event type
    #[arg(long)]
    pub event_type: String,
    /// Event id (generated when omitted)
    #[arg(long)]
    pub event_id: Option<String>,
    /// Event data as JSON
    #[arg(short, long)]
    pub data: String,
    /// Version the aggregate is expected to be at (0 skips the check)
    #[arg(long, default_value_t = 0)]
    pub expected_version: u64,
}

#[derive(Subcommand, Debug)]
pub enum AggregateCommand {
    /// Show an aggregate and its most recent events
    Get {
        /// Aggregate type
        #[arg(short = 't', long = "type")]
        aggregate_type: String,
        /// Aggregate id
        id: String,
        /// Number of most recent events to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Print whether an aggregate exists
    Exists {
        /// Aggregate type
        #[arg(short = 't', long = "type")]
        aggregate_type: String,
        /// Aggregate id
        id: String,
    },
    /// Delete every aggregate of a type
    Delete {
        /// Aggregate type
        #[arg(short = 't', long = "type")]
        aggregate_type: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum FeedCommand {
    /// Tail a feed until interrupted
    Get {
        /// Feed name
        name: String,
        /// Start after this sequence number
        #[arg(short, long, default_value_t = 0)]
        since: u64,
        /// Only print the current sequence number
        #[arg(short, long)]
        current: bool,
    },
    /// List feeds with aggregate, batch and event counts
    List,
}

#[derive(Subcommand, Debug)]
pub enum ProjectionCommand {
    /// Show one aggregate's projection
    Single {
        /// Projection name
        name: String,
        /// Aggregate id
        id: String,
    },
    /// Show an aggregated projection
    Aggregated {
        /// Projection name
        name: String,
    },
    /// List aggregated projections, or the single projections of NAME
    List {
        /// Projection name
        name: Option<String>,
    },
    /// List projection definitions
    Definitions,
    /// Show a projection definition
    Definition {
        /// Projection name
        name: String,
    },
    /// Create a projection definition from a JSON file
    Create {
        /// Path to the definition
        file: PathBuf,
    },
    /// Delete a projection definition
    Delete {
        /// Projection name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReactionCommand {
    /// List reaction definitions
    Definitions,
    /// Show a reaction definition
    Definition {
        /// Reaction name
        name: String,
    },
    /// Create a reaction definition from a JSON file
    Create {
        /// Path to the definition
        file: PathBuf,
    },
    /// Delete a reaction definition
    Delete {
        /// Reaction name
        name: String,
    },
}
