use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Package the functions directory and publish it to the object store.
///
/// The deployment environment is selected with the `DEPLOY_ENV` environment variable.
#[derive(Parser)]
#[command(about, version)]
pub(crate) struct Cli {
    /// Configuration file path. Defaults to `Deploy.toml` inside of the project root.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project root containing the package manifest and functions directory.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the functions archive and publish it with the index configuration.
    Deploy {
        /// Also publish the rules files.
        #[arg(long)]
        rules: bool,
    },

    /// Build the functions archive without publishing anything.
    Build,
}
