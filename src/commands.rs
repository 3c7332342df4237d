//! CLI command definitions
//!
//! Defines the clap commands for the bench sequencer CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test sequence against the bench
    Run {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Resource to connect to (default: from config)
        #[arg(long, short)]
        resource: Option<String>,

        /// Print results as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Show every step as it runs
        #[arg(long, short)]
        verbose: bool,

        /// Also write a detailed log to this file (default: runs.log in the data directory)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        log_file: Option<Option<PathBuf>>,
    },

    /// Validate a sequence file without running it
    Check {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Also resolve every step against the bench's commands
        #[arg(long)]
        commands: bool,
    },

    /// List the commands the bench drivers provide
    Commands {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create and edit sequence files
    #[command(subcommand)]
    Sequence(SequenceCommands),

    /// Show or create the configuration file
    Config {
        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
pub enum SequenceCommands {
    /// Create an empty sequence file
    New {
        /// Path of the file to create
        path: PathBuf,

        /// Sequence name
        #[arg(long)]
        name: String,

        /// Sequence version
        #[arg(long, default_value = "1.0")]
        version: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the tests in a sequence
    List {
        /// Path to the sequence JSON file
        path: PathBuf,
    },

    /// Append a test to a sequence
    Add {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test name
        #[arg(long)]
        name: String,

        /// Steps as a comma-joined list of calls, e.g. "setup_voltage(5, 1), power_on()"
        #[arg(long, default_value = "")]
        steps: String,

        /// Lower limit (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        min: f64,

        /// Upper limit (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        max: f64,

        /// Units of the measured value
        #[arg(long, default_value = "")]
        units: String,

        /// Test id (default: next free id)
        #[arg(long)]
        id: Option<i64>,

        /// Add the test disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Change fields of an existing test
    Edit {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test id
        id: i64,

        /// New test name
        #[arg(long)]
        name: Option<String>,

        /// New steps as a comma-joined list of calls
        #[arg(long)]
        steps: Option<String>,

        /// New lower limit (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,

        /// New upper limit (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,

        /// New units
        #[arg(long)]
        units: Option<String>,

        /// Save to this file instead of overwriting the input
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Remove a test by id
    Remove {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test id
        id: i64,
    },

    /// Enable a test
    Enable {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test id
        id: i64,
    },

    /// Disable a test
    Disable {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test id
        id: i64,
    },

    /// Flip a test between enabled and disabled
    Toggle {
        /// Path to the sequence JSON file
        path: PathBuf,

        /// Test id
        id: i64,
    },
}
