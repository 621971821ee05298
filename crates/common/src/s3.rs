use std::{fs, io, path::Path};

pub use aws_sdk_s3::{primitives::ByteStream, Error};
use aws_sdk_s3::{
    config::{Builder, Credentials, Region},
    types::ObjectCannedAcl,
    Client,
};
use derive_more::{Display, Error, From};
use serde::Deserialize;

use crate::config;

/// Errors that may occur while constructing a [`ConfiguredClient`].
#[derive(Debug, Display, From, Error)]
pub enum ClientError {
    /// Unable to read the credentials file.
    Io(io::Error),

    /// Credentials file is not a valid key file.
    #[display(fmt = "invalid credentials file: {}", _0)]
    Credentials(serde_json::Error),
}

/// HMAC key pair used to sign object store requests.
#[derive(Deserialize)]
pub(crate) struct KeyFile {
    /// Access key identifier.
    pub(crate) access_key_id: String,

    /// Secret access key.
    pub(crate) secret_access_key: String,
}

impl KeyFile {
    /// Load the key pair from a JSON credentials file.
    pub(crate) fn read(path: &Path) -> Result<Self, ClientError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

/// Configured S3-compatible client.
pub struct ConfiguredClient<'a> {
    config: &'a config::Storage,
    client: Client,
}

impl<'a> ConfiguredClient<'a> {
    /// Create new [`ConfiguredClient`] from the provided [`Storage`] configuration
    /// and the credentials file of the selected deployment target.
    ///
    /// [`Storage`]: config::Storage
    pub async fn new(
        config: &'a config::Storage,
        credentials_path: &Path,
    ) -> Result<ConfiguredClient<'a>, ClientError> {
        let key_file = KeyFile::read(credentials_path)?;

        let sdk_config = aws_config::from_env()
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                key_file.access_key_id,
                key_file.secret_access_key,
                None,
                None,
                "deploy-key-file",
            ))
            .load()
            .await;

        let s3_config = Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Ok(ConfiguredClient {
            config,
            client: Client::from_conf(s3_config),
        })
    }

    /// Upload an object into the provided bucket.
    pub async fn put_object<F>(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        file: F,
    ) -> Result<(), Error>
    where
        ByteStream: From<F>,
    {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(file))
            .send()
            .await?;

        Ok(())
    }

    /// Grant public read access to an existing object.
    pub async fn make_public(&self, bucket: &str, key: &str) -> Result<(), Error> {
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await?;

        Ok(())
    }

    /// Public URL of an object.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        public_url(&self.config.endpoint_url, bucket, key)
    }
}

/// Public URL of an object stored at the provided endpoint.
pub fn public_url(endpoint_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{bucket}/{key}", endpoint_url.trim_end_matches('/'))
}
