//! # Functions deployer
//!
//! Packages the functions directory of a project into a zip archive and publishes it,
//! together with the index configuration, to an S3-compatible object store bucket.
//!
//! The archive is named after the package manifest (`{name}-v{version}.zip`) and is
//! published under the configured archive prefix. Every published object is made
//! publicly readable.
//!
//! Deployment targets (project, credentials and bucket) exist for the staging and
//! production environments, and the `DEPLOY_ENV` environment variable selects between
//! them once at startup.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

/// Functions directory archiving utilities.
mod archiver;

/// CLI configuration and available subcommands.
mod cli;

/// Package manifest parsing.
mod manifest;

/// Build-and-publish pipeline.
mod pipeline;

/// Object store uploads.
mod publisher;

/// In-memory object store used by unit tests.
#[cfg(test)]
mod testing;

use clap::Parser;
use cli::{Cli, Command};
use common::{
    config::{Config, Environment, DEFAULT_CONFIG_FILE},
    logging,
    s3::ConfiguredClient,
};
use pipeline::Pipeline;
use tracing::{info, warn};

/// CLI entrypoint.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = Config::new(Some(
        cli.config
            .unwrap_or_else(|| cli.root.join(DEFAULT_CONFIG_FILE)),
    ))?;

    logging::init(&config.logging);

    let environment = Environment::from_env();
    info!("deploying to the {} environment", environment);

    let pipeline = Pipeline::new(cli.root, &config, environment);

    match cli.command {
        Command::Build => {
            let archive = pipeline.build().await?;
            info!(
                "{} {} archived at {} ({})",
                archive.target.name,
                archive.target.version,
                archive.path.display(),
                archive.digest
            );
        }
        Command::Deploy { rules } => {
            let pipeline = pipeline.with_rules(rules);
            let client = ConfiguredClient::new(&config.storage, &pipeline.credentials_path()).await?;

            let report = pipeline.run(&client).await?;

            for object in &report.published {
                info!("published {} at {}", object.key, object.url);
            }

            if !report.is_complete() {
                for failure in &report.failures {
                    warn!(
                        "{} was not published: {}",
                        failure.local_path.display(),
                        failure.error
                    );
                }

                warn!(
                    "deployment of {} finished with {} failed upload(s)",
                    report.archive.filename,
                    report.failures.len()
                );
            }
        }
    }

    Ok(())
}
