//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Dependency-aware concurrent test runner
#[derive(Parser, Debug)]
#[command(name = "test-cascade")]
#[command(version)]
#[command(about = "Run the bundled sample suites with dependency-ordered, concurrent execution")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// List registered tests
    List(ListArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Only run tests whose full id starts with this prefix (repeatable);
    /// their dependencies are included automatically
    #[arg(short, long = "filter")]
    pub filters: Vec<String>,

    /// Named test profile from the config file or the built-in set
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(long)]
    pub format: Option<String>,

    /// What to do with tests whose dependencies failed (wait, fail)
    #[arg(long)]
    pub policy: Option<String>,

    /// Default timeout in seconds for tests that do not set one
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Show live progress and wait for Enter or Ctrl-C before exiting
    #[arg(short, long)]
    pub interactive: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Save results to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show dependencies, timeouts and descriptions
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Output as JSON instead of YAML
        #[arg(long)]
        json: bool,

        /// List the environment variables that override the file
        #[arg(long)]
        env: bool,
    },

    /// Write an example configuration file
    Init {
        /// Where to write the file
        #[arg(short, long, default_value = "./test-cascade.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
