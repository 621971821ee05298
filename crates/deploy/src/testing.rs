use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use common::s3;

use crate::publisher::{ObjectStore, StoreError};

/// Endpoint used to build public URLs of stored objects.
const ENDPOINT_URL: &str = "https://storage.example";

/// Object kept by [`MemoryStore`].
#[derive(Clone, Debug)]
pub(crate) struct StoredObject {
    /// Local file the object was streamed from.
    pub source: PathBuf,

    /// Object contents.
    pub body: Vec<u8>,

    /// Content type sent with the upload.
    pub content_type: String,

    /// Whether the object was made public.
    pub public: bool,
}

/// In-memory [`ObjectStore`] that rejects every write into the configured buckets.
#[derive(Default)]
pub(crate) struct MemoryStore {
    /// Buckets refusing writes.
    rejected_buckets: BTreeSet<String>,

    /// Stored objects, keyed by bucket and object key.
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,

    /// Keys of every attempted put, in request order.
    put_requests: Mutex<Vec<String>>,

    /// Number of ACL change requests.
    acl_requests: Mutex<usize>,
}

impl MemoryStore {
    /// Store that refuses every write into `bucket`.
    pub(crate) fn rejecting(bucket: &str) -> Self {
        Self {
            rejected_buckets: BTreeSet::from([bucket.to_owned()]),
            ..Default::default()
        }
    }

    /// Copy of a stored object, if present.
    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .expect("poisoned lock")
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Keys of every attempted put, in request order.
    pub(crate) fn put_requests(&self) -> Vec<String> {
        self.put_requests.lock().expect("poisoned lock").clone()
    }

    /// Number of ACL change requests, successful or not.
    pub(crate) fn acl_requests(&self) -> usize {
        *self.acl_requests.lock().expect("poisoned lock")
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        self.put_requests
            .lock()
            .expect("poisoned lock")
            .push(key.to_owned());

        if self.rejected_buckets.contains(bucket) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write access to {bucket} denied"),
            )));
        }

        let body = fs::read(path)?;

        self.objects.lock().expect("poisoned lock").insert(
            (bucket.to_owned(), key.to_owned()),
            StoredObject {
                source: path.to_path_buf(),
                body,
                content_type: content_type.to_owned(),
                public: false,
            },
        );

        Ok(())
    }

    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        *self.acl_requests.lock().expect("poisoned lock") += 1;

        match self
            .objects
            .lock()
            .expect("poisoned lock")
            .get_mut(&(bucket.to_owned(), key.to_owned()))
        {
            Some(object) => {
                object.public = true;
                Ok(())
            }
            None => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such object: {key}"),
            ))),
        }
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        s3::public_url(ENDPOINT_URL, bucket, key)
    }
}
