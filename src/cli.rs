use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clustercap")]
#[command(about = "Inspect and analyze clustercap diagnostic archives", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Raise the log level (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the health checks against a capture archive.
    Analyze {
        archive: PathBuf,
        /// Maximum number of example issues to display per check
        #[arg(long, default_value_t = 5)]
        examples: usize,
        /// Display all issues detected by each check
        #[arg(long)]
        all_examples: bool,
        /// JSON file overriding check thresholds
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print intermediate details while checks run
        #[arg(long, hide = true)]
        very_verbose: bool,
    },

    /// Summarize the contents and topology of an archive.
    Inspect {
        archive: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Find artifacts by tag and print them.
    Query {
        archive: PathBuf,
        #[command(flatten)]
        filter: QueryFilter,
        /// Print matching paths instead of loading a single artifact
        #[arg(long)]
        list: bool,
    },

    /// Write the raw bytes of one archive entry to stdout.
    Cat { archive: PathBuf, path: String },
}

#[derive(Args, Debug, Default)]
pub(crate) struct QueryFilter {
    #[arg(long)]
    pub(crate) cluster: Option<String>,
    #[arg(long)]
    pub(crate) server: Option<String>,
    #[arg(long)]
    pub(crate) account: Option<String>,
    #[arg(long)]
    pub(crate) stream: Option<String>,
    /// Artifact type (health, variables, stream_info, ...)
    #[arg(long = "type")]
    pub(crate) artifact_type: Option<String>,
    #[arg(long)]
    pub(crate) profile_name: Option<String>,
}
