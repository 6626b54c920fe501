//! Object-storage backend (S3 and S3-compatible services).
//!
//! Object storage has no directories, so a logical directory is a key prefix:
//! it exists when at least one object lives under `path/`, and listings are
//! truncated to the first segment after the prefix. Files are transferred one
//! object at a time.

use super::{BackendKind, StorageBackend, StorageError, StorageResult, join_path};
use crate::models::bucket::BucketName;
use crate::services::local_tree::{join_relative, walk_files};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::{
    Certificate, ClientOptions, ObjectStore, PutMode, PutPayload, WriteMultipart,
    aws::AmazonS3Builder, path::Path as ObjectPath,
};
use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Files above this size are streamed through a multipart upload.
const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Read buffer used when streaming a file into a multipart upload.
const UPLOAD_CHUNK: usize = 1024 * 1024;

/// Marker object that makes an empty index container listable.
const CONTAINER_MARKER: &str = ".keep";

/// TLS certificate handling for the object-storage endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CertVerification {
    /// Verify against the system trust store.
    #[default]
    System,
    /// Accept any certificate.
    Disabled,
    /// Additionally trust the PEM certificate(s) in this file.
    RootCertificate(PathBuf),
}

/// Connection settings for an S3-compatible archive.
#[derive(Clone, Default)]
pub struct ObjectStorageConfig {
    /// Bucket (container) holding the archive.
    pub bucket: String,

    /// Key prefix inside the bucket acting as archive root. May be empty.
    pub archive_dir: String,

    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,

    /// Custom endpoint for on-premise services. `http://` endpoints are allowed.
    pub endpoint: Option<String>,

    pub verify_cert: CertVerification,
}

impl fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorageConfig")
            .field("bucket", &self.bucket)
            .field("archive_dir", &self.archive_dir)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("verify_cert", &self.verify_cert)
            .finish()
    }
}

/// Archive stored as objects under `s3://<bucket>/<archive_dir>/`.
#[derive(Clone)]
pub struct ObjectStorageBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    root: String,
}

impl ObjectStorageBackend {
    /// Build an S3 client from `config` and validate the archive location.
    pub async fn connect(config: &ObjectStorageConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::BackendUnavailable(
                "object storage bucket is not configured".into(),
            ));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
        if let Some(key) = &config.access_key {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let mut client_options = ClientOptions::new();
        match &config.verify_cert {
            CertVerification::System => {}
            CertVerification::Disabled => {
                client_options = client_options.with_allow_invalid_certificates(true);
            }
            CertVerification::RootCertificate(path) => {
                let pem = fs::read(path).await.map_err(|e| {
                    StorageError::BackendUnavailable(format!(
                        "cannot read certificate `{}`: {e}",
                        path.display()
                    ))
                })?;
                let cert = Certificate::from_pem(&pem).map_err(|e| {
                    StorageError::BackendUnavailable(format!(
                        "invalid certificate `{}`: {e}",
                        path.display()
                    ))
                })?;
                client_options = client_options.with_root_certificate(cert);
            }
        }

        let store = builder
            .with_client_options(client_options)
            .build()
            .map_err(|e| StorageError::BackendUnavailable(format!("cannot build s3 client: {e}")))?;

        Self::with_store(Arc::new(store), &config.bucket, &config.archive_dir).await
    }

    /// Bind to an already-built store and validate it with a write probe.
    pub async fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        archive_dir: &str,
    ) -> StorageResult<Self> {
        let backend = Self {
            store,
            bucket: bucket.into(),
            root: archive_dir.trim_matches('/').to_string(),
        };

        let probe = backend.key(&format!(".frozen-archive-probe-{}", Uuid::new_v4()));
        let probe_result = async {
            backend
                .store
                .put(&probe, PutPayload::from_static(b"probe"))
                .await?;
            backend.store.delete(&probe).await
        }
        .await;
        if let Err(err) = probe_result {
            return Err(StorageError::BackendUnavailable(format!(
                "cannot write to {}: {err}",
                backend.describe("")
            )));
        }

        debug!(bucket = %backend.bucket, root = %backend.root, "object storage backend ready");
        Ok(backend)
    }

    fn key(&self, path: &str) -> ObjectPath {
        ObjectPath::from(join_path([self.root.as_str(), path]))
    }

    async fn list_objects(
        &self,
        prefix: &ObjectPath,
    ) -> StorageResult<Vec<object_store::ObjectMeta>> {
        Ok(self.store.list(listing_prefix(prefix)).try_collect().await?)
    }

    async fn upload_file(
        &self,
        source: &Path,
        size: u64,
        key: &ObjectPath,
    ) -> object_store::Result<()> {
        if size <= MULTIPART_THRESHOLD {
            let data = fs::read(source).await.map_err(|e| io_error(source, e))?;
            self.store.put(key, PutPayload::from(Bytes::from(data))).await?;
            return Ok(());
        }

        let file = fs::File::open(source).await.map_err(|e| io_error(source, e))?;
        let mut chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK);
        let upload = self.store.put_multipart(key).await?;
        let mut writer = WriteMultipart::new(upload);
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = writer.abort().await;
                    return Err(io_error(source, err));
                }
            };
            writer.wait_for_capacity(4).await?;
            writer.write(&chunk);
        }
        writer.finish().await?;
        Ok(())
    }

    async fn download_object(&self, key: &ObjectPath, target: &Path) -> StorageResult<u64> {
        let parent = target.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(std::io::Error::other("restore target missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        let mut stream = self.store.get(key).await?.into_stream();
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp_path).await?;
        let mut written = 0u64;
        let result: StorageResult<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, target).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(written)
    }
}

/// `None` for the bucket root, since an empty path lists everything anyway.
fn listing_prefix(prefix: &ObjectPath) -> Option<&ObjectPath> {
    (!prefix.as_ref().is_empty()).then_some(prefix)
}

fn relative_key(location: &ObjectPath, prefix: &ObjectPath) -> Option<String> {
    let parts: Vec<String> = location
        .prefix_match(prefix)?
        .map(|part| part.as_ref().to_string())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn io_error(path: &Path, source: std::io::Error) -> object_store::Error {
    object_store::Error::Generic {
        store: "local",
        source: Box::new(std::io::Error::new(
            source.kind(),
            format!("{}: {source}", path.display()),
        )),
    }
}

fn not_found(path: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(path.to_string()),
        other => StorageError::ObjectStore(other),
    }
}

#[async_trait]
impl StorageBackend for ObjectStorageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStorage
    }

    fn describe(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, join_path([self.root.as_str(), path]))
    }

    async fn exists(&self, path: &str) -> bool {
        let prefix = self.key(path);
        let mut listing = self.store.list(listing_prefix(&prefix));
        matches!(listing.next().await, Some(Ok(_)))
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let prefix = self.key(path);
        let objects = self.list_objects(&prefix).await?;
        Ok(objects.iter().map(|o| o.size as u64).sum())
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        if self.exists(name).await {
            return Ok(());
        }
        let marker = self.key(&join_path([name, CONTAINER_MARKER]));
        debug!(container = %self.describe(name), "creating index container");
        self.store.put(&marker, PutPayload::new()).await?;
        Ok(())
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        let root = self.key("");
        let listing = self.store.list_with_delimiter(listing_prefix(&root)).await?;
        Ok(listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn copy_in(&self, local_source: &Path, path: &str) -> StorageResult<u64> {
        let files = walk_files(local_source).await.map_err(|e| {
            StorageError::copy_failed(local_source.display(), self.describe(path), e)
        })?;

        let mut copied = 0;
        for file in files {
            let key = self.key(&join_path([path, file.relative.as_str()]));
            debug!(source = %file.path.display(), key = %key, "uploading file");
            self.upload_file(&file.path, file.size, &key)
                .await
                .map_err(|e| {
                    StorageError::copy_failed(
                        file.path.display(),
                        format!("s3://{}/{key}", self.bucket),
                        e,
                    )
                })?;
            copied += file.size;
        }
        Ok(copied)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let key = self.key(prefix);
        let listing = self.store.list_with_delimiter(listing_prefix(&key)).await?;
        let children = listing
            .common_prefixes
            .iter()
            .chain(listing.objects.iter().map(|o| &o.location))
            .filter_map(|location| relative_key(location, &key))
            .filter_map(|rel| rel.split('/').next().map(str::to_string))
            .filter(|name| BucketName::is_bucket_like(name))
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        let prefix = self.key(path);
        for object in self.list_objects(&prefix).await? {
            debug!(key = %object.location, "deleting object");
            match self.store.delete(&object.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn restore_out(&self, path: &str, local_target: &Path) -> StorageResult<u64> {
        let prefix = self.key(path);
        let objects = self.list_objects(&prefix).await?;
        if objects.is_empty() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        fs::create_dir_all(local_target).await?;
        let mut restored = 0;
        for object in objects {
            let Some(relative) = relative_key(&object.location, &prefix) else {
                continue;
            };
            let target = join_relative(local_target, &relative);
            debug!(key = %object.location, target = %target.display(), "downloading object");
            restored += self
                .download_object(&object.location, &target)
                .await
                .map_err(|e| {
                    StorageError::copy_failed(
                        format!("s3://{}/{}", self.bucket, object.location),
                        target.display(),
                        e,
                    )
                })?;
        }
        Ok(restored)
    }

    async fn lock_exists(&self, path: &str) -> bool {
        self.store.head(&self.key(path)).await.is_ok()
    }

    async fn write_lock(&self, path: &str, payload: &str) -> StorageResult<bool> {
        let key = self.key(path);
        let body = PutPayload::from(payload.to_string());
        match self.store.put_opts(&key, body.clone(), PutMode::Create.into()).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(object_store::Error::NotImplemented { .. }) => {
                // Services without conditional writes: plain put after the
                // existence check done by the caller.
                debug!(key = %key, "conditional put unsupported, falling back to plain put");
                self.store.put(&key, body).await?;
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_lock(&self, path: &str) -> StorageResult<String> {
        let bytes = self
            .store
            .get(&self.key(path))
            .await
            .map_err(|e| not_found(path, e))?
            .bytes()
            .await?;
        Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
    }

    async fn lock_age(&self, path: &str) -> StorageResult<DateTime<Utc>> {
        let meta = self
            .store
            .head(&self.key(path))
            .await
            .map_err(|e| not_found(path, e))?;
        Ok(meta.last_modified)
    }

    async fn remove_lock(&self, path: &str) -> StorageResult<()> {
        match self.store.delete(&self.key(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
