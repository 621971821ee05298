use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use common::s3::{self, ConfiguredClient};
use derive_more::{Display, Error, From};
use tracing::{info, instrument};

/// Object store errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum StoreError {
    /// S3 API error.
    S3(s3::Error),

    /// Transport or local IO error.
    Io(io::Error),
}

/// Minimal object store interface required for publishing.
#[async_trait]
pub(crate) trait ObjectStore: Send + Sync {
    /// Stream the file at `path` into `bucket` under `key`.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<(), StoreError>;

    /// Make an existing object publicly readable.
    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Public URL of an object.
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

#[async_trait]
impl ObjectStore for ConfiguredClient<'_> {
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        let body = s3::ByteStream::from_path(path)
            .await
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;

        Ok(ConfiguredClient::put_object(self, bucket, key, content_type, body).await?)
    }

    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        Ok(ConfiguredClient::make_public(self, bucket, key).await?)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        ConfiguredClient::public_url(self, bucket, key)
    }
}

/// Upload errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum UploadError {
    /// Unable to read the local file.
    #[display(fmt = "unable to read local file: {}", _0)]
    Read(io::Error),

    /// Object store rejected the request.
    #[display(fmt = "object store request failed: {}", _0)]
    Store(StoreError),

    /// Local path has no file name to use as the object name.
    #[display(fmt = "unable to derive an object name from '{}'", _0)]
    NoObjectName(#[error(ignore)] String),
}

/// Request to publish a single local file.
#[derive(Clone, Debug)]
pub(crate) struct UploadJob<'a> {
    /// Destination bucket.
    pub bucket: &'a str,

    /// Local file to upload.
    pub local_path: PathBuf,

    /// Remote object name. Defaults to the local file name.
    pub remote_name: Option<String>,
}

impl UploadJob<'_> {
    /// Remote object name used for this upload.
    pub(crate) fn object_name(&self) -> Result<String, UploadError> {
        if let Some(name) = &self.remote_name {
            return Ok(name.clone());
        }

        self.local_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(String::from)
            .ok_or_else(|| UploadError::NoObjectName(self.local_path.display().to_string()))
    }
}

/// Successfully published object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Published {
    /// Object key inside of the bucket.
    pub key: String,

    /// Public URL of the object.
    pub url: String,
}

/// Content type reported for the uploaded object.
fn content_type(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, extension)| extension) {
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Upload a local file and make it publicly readable.
///
/// The object is only made public after the upload itself succeeded.
#[instrument(skip_all, fields(bucket = job.bucket, path = %job.local_path.display()), err)]
pub(crate) async fn upload<S>(store: &S, job: &UploadJob<'_>) -> Result<Published, UploadError>
where
    S: ObjectStore + ?Sized,
{
    let key = job.object_name()?;
    tokio::fs::metadata(&job.local_path)
        .await
        .map_err(UploadError::Read)?;

    store
        .put_file(job.bucket, &key, content_type(&key), &job.local_path)
        .await?;
    store.make_public(job.bucket, &key).await?;

    info!("{} uploaded to {}", job.local_path.display(), job.bucket);

    Ok(Published {
        url: store.public_url(job.bucket, &key),
        key,
    })
}
