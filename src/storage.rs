use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::{S3Config, StorageConfig};

/// Blob store for uploaded files, addressed by relative keys like `upload/recipe/<uuid>.png`.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// URL a client can fetch the object from.
    async fn object_url(&self, key: &str) -> anyhow::Result<String>;
}

pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageClient>> {
    let storage: Arc<dyn StorageClient> = match config {
        StorageConfig::Local { root, url_prefix } => {
            info!(root = %root.display(), "using local media storage");
            Arc::new(LocalStorage::new(root.clone(), url_prefix.clone()))
        }
        StorageConfig::S3(s3) => {
            info!(endpoint = %s3.endpoint, bucket = %s3.bucket, "using s3 media storage");
            Arc::new(S3Storage::connect(s3).await)
        }
    };
    Ok(storage)
}

/// Files under a directory on local disk, served back by the app under `url_prefix`.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self { root, url_prefix }
    }

    /// Resolves a key inside `root`, refusing anything that could escape it.
    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        anyhow::ensure!(safe, "invalid storage key {key:?}");
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(key, bytes = body.len(), "stored object on disk");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn object_url(&self, key: &str) -> anyhow::Result<String> {
        Ok(format!("{}/{}", self.url_prefix.trim_end_matches('/'), key))
    }
}

/// Objects in one bucket; URLs handed out are presigned GETs.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    presign_ttl: Duration,
}

impl S3Storage {
    pub async fn connect(cfg: &S3Config) -> Self {
        let credentials = Credentials::new(
            cfg.access_key.as_str(),
            cfg.secret_key.as_str(),
            None,
            None,
            "recipe-api-env",
        );
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        // MinIO serves buckets by path, not by virtual host.
        let s3 = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3),
            bucket: cfg.bucket.clone(),
            presign_ttl: Duration::from_secs(cfg.presign_ttl_secs),
        }
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(len as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {key} to bucket {}", self.bucket))?;
        debug!(key, bytes = len, "stored object in bucket");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete {key} from bucket {}", self.bucket))?;
        debug!(key, "deleted object from bucket");
        Ok(())
    }

    async fn object_url(&self, key: &str) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(self.presign_ttl)
            .context("build presigning config")?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("presign {key}"))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf(), "/media/".into());
        (dir, storage)
    }

    #[tokio::test]
    async fn put_then_delete_round_trips_on_disk() {
        let (_dir, storage) = local();
        let key = "upload/recipe/abc.png";
        storage
            .put_object(key, Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        let path = storage.path_for(key).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"png");

        storage.delete_object(key).await.unwrap();
        assert!(!path.exists());
        // deleting twice is fine
        storage.delete_object(key).await.unwrap();
    }

    #[tokio::test]
    async fn object_url_joins_prefix_and_key() {
        let (_dir, storage) = local();
        let url = storage.object_url("upload/recipe/x.jpg").await.unwrap();
        assert_eq!(url, "/media/upload/recipe/x.jpg");
    }

    #[test]
    fn rejects_keys_escaping_root() {
        let (_dir, storage) = local();
        assert!(storage.path_for("../etc/passwd").is_err());
        assert!(storage.path_for("/etc/passwd").is_err());
        assert!(storage.path_for("").is_err());
        assert!(storage.path_for("upload/recipe/x.png").is_ok());
    }
}
