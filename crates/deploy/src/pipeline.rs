use std::{io, path::PathBuf};

use common::{
    config::{Config, Environment, FailurePolicy, Target},
    hash,
};
use derive_more::{Display, Error, From};
use tokio::task::{self, JoinError};
use tracing::{error, info, instrument};

use crate::{
    archiver::{build_archive, ArchiveJob, ArchiverError},
    manifest::{BuildTarget, Manifest, ManifestError},
    publisher::{upload, ObjectStore, Published, UploadError, UploadJob},
};

/// Deployment pipeline errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum PipelineError {
    /// Unable to read the package manifest.
    #[display(fmt = "unable to read package manifest: {}", _0)]
    Manifest(ManifestError),

    /// Unable to build the functions archive.
    #[display(fmt = "unable to create zip archive: {}", _0)]
    Archiver(ArchiverError),

    /// Unable to read the built archive back.
    Io(io::Error),

    /// Blocking digest task did not complete.
    Join(JoinError),

    /// Upload failed while the abort policy is active.
    #[display(fmt = "deployment aborted: {}", _0)]
    Upload(UploadError),
}

/// Archive produced by the build stage.
#[derive(Debug)]
pub(crate) struct BuiltArchive {
    /// Package the archive was built for.
    pub target: BuildTarget,

    /// Archive file name.
    pub filename: String,

    /// Archive location on disk.
    pub path: PathBuf,

    /// Hex-encoded blake2b-256 digest of the archive.
    pub digest: String,
}

/// Upload that did not succeed.
#[derive(Debug)]
pub(crate) struct UploadFailure {
    /// Local file that was not published.
    pub local_path: PathBuf,

    /// Failure cause.
    pub error: UploadError,
}

/// Outcome of a deployment.
#[derive(Debug)]
pub(crate) struct DeployReport {
    /// Archive that was published.
    pub archive: BuiltArchive,

    /// Objects published successfully, in upload order.
    pub published: Vec<Published>,

    /// Uploads that failed under the continue policy.
    pub failures: Vec<UploadFailure>,
}

impl DeployReport {
    /// Whether every upload succeeded.
    pub(crate) fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build-and-publish pipeline for a single project root and environment.
pub(crate) struct Pipeline<'a> {
    root: PathBuf,
    config: &'a Config,
    environment: Environment,
    publish_rules: bool,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline resolving all layout paths relative to `root`.
    pub(crate) fn new(root: PathBuf, config: &'a Config, environment: Environment) -> Self {
        Self {
            root,
            config,
            environment,
            publish_rules: config.publishing.publish_rules,
        }
    }

    /// Additionally publish rules files, regardless of the configuration.
    pub(crate) fn with_rules(mut self, publish_rules: bool) -> Self {
        self.publish_rules |= publish_rules;
        self
    }

    /// Deployment target selected for the pipeline environment.
    pub(crate) fn target(&self) -> &'a Target {
        self.config.target(self.environment)
    }

    /// Credentials file of the selected deployment target.
    pub(crate) fn credentials_path(&self) -> PathBuf {
        self.root.join(&self.target().credentials_path)
    }

    /// Read the manifest and package the functions directory.
    #[instrument(skip_all, err)]
    pub(crate) async fn build(&self) -> Result<BuiltArchive, PipelineError> {
        let layout = &self.config.layout;

        let target = Manifest::read(&self.root.join(&layout.manifest))?.build_target()?;
        let filename = target.archive_filename();

        let path = build_archive(&ArchiveJob {
            source_dir: self.root.join(&layout.source_dir),
            dest_dir: self.root.join(&layout.archive_dir),
            filename: filename.clone(),
        })
        .await?;

        let digest = {
            let path = path.clone();
            task::spawn_blocking(move || hash::file_digest(&path)).await??
        };
        info!("built {} ({})", path.display(), digest);

        Ok(BuiltArchive {
            target,
            filename,
            path,
            digest,
        })
    }

    /// Uploads performed for the provided archive, in order.
    pub(crate) fn upload_jobs(&self, archive: &BuiltArchive) -> Vec<UploadJob<'a>> {
        let layout = &self.config.layout;
        let bucket = self.target().bucket.as_str();

        let prefix = layout.archive_prefix.trim_end_matches('/');
        let archive_name = if prefix.is_empty() {
            archive.filename.clone()
        } else {
            format!("{prefix}/{}", archive.filename)
        };

        let mut jobs = vec![
            UploadJob {
                bucket,
                local_path: archive.path.clone(),
                remote_name: Some(archive_name),
            },
            UploadJob {
                bucket,
                local_path: self.root.join(&layout.index_file),
                remote_name: None,
            },
        ];

        if self.publish_rules {
            jobs.extend(layout.rules_files.iter().map(|path| UploadJob {
                bucket,
                local_path: self.root.join(path),
                remote_name: None,
            }));
        }

        jobs
    }

    /// Upload the archive and the accompanying configuration files.
    ///
    /// Upload failures are handled according to the configured [`FailurePolicy`].
    #[instrument(skip_all, fields(environment = %self.environment), err)]
    pub(crate) async fn publish<S>(
        &self,
        store: &S,
        archive: BuiltArchive,
    ) -> Result<DeployReport, PipelineError>
    where
        S: ObjectStore + ?Sized,
    {
        let target = self.target();
        info!("publishing to {} in project {}", target.bucket, target.project_id);

        let mut published = Vec::new();
        let mut failures = Vec::new();

        for job in self.upload_jobs(&archive) {
            match upload(store, &job).await {
                Ok(object) => published.push(object),
                Err(error) => match self.config.publishing.on_upload_failure {
                    FailurePolicy::Abort => return Err(error.into()),
                    FailurePolicy::Continue => {
                        error!("unable to upload {}: {}", job.local_path.display(), error);
                        failures.push(UploadFailure {
                            local_path: job.local_path,
                            error,
                        });
                    }
                },
            }
        }

        Ok(DeployReport {
            archive,
            published,
            failures,
        })
    }

    /// Build the archive and publish it.
    pub(crate) async fn run<S>(&self, store: &S) -> Result<DeployReport, PipelineError>
    where
        S: ObjectStore + ?Sized,
    {
        let archive = self.build().await?;
        self.publish(store, archive).await
    }
}
