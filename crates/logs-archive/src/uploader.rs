// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hands finished archives to blob storage.
//!
//! The exporter never uploads; the [`crate::archiver::Archiver`] decides which
//! archives to ship and under which key, then calls an [`Uploader`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::archive::Codec;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write object {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("object store rejected {key} with status {status}: {body}")]
    Rejected {
        key: String,
        status: u16,
        body: String,
    },
    #[error("invalid upload endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Where an archive ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bucket: String,
    pub key: String,
    pub bytes: u64,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores the archive at `path` under `key`.
    async fn upload(&self, path: &Path, key: &str) -> Result<Upload, UploadError>;
}

/// Object key of a stream's archive for one run: `<prefix>/<stream>/<run_stamp>.<ext>`.
#[must_use]
pub fn object_key(prefix: &str, stream: &str, run_stamp: &str, codec: Codec) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{stream}/{run_stamp}.{}", codec.extension())
    } else {
        format!("{prefix}/{stream}/{run_stamp}.{}", codec.extension())
    }
}

/// Uploads with `PUT <endpoint>/<bucket>/<key>` against a path-style object store.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpUploader {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(UploadError::InvalidEndpoint(endpoint));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, path: &Path, key: &str) -> Result<Upload, UploadError> {
        let read_error = |source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(read_error)?;
        let bytes = file.metadata().await.map_err(read_error)?.len();

        let resp = self
            .client
            .put(self.object_url(key))
            .header(CONTENT_LENGTH, bytes)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        debug!(bucket = %self.bucket, key, bytes, "uploaded archive");
        Ok(Upload {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            bytes,
        })
    }
}

/// Copies archives into `<root>/<bucket>/<key>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
    bucket: String,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload(&self, path: &Path, key: &str) -> Result<Upload, UploadError> {
        let destination = self.root.join(&self.bucket).join(key);
        let write_error = |source| UploadError::Write {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_error)?;
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(UploadError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "archive is missing"),
            });
        }
        let bytes = tokio::fs::copy(path, &destination)
            .await
            .map_err(write_error)?;

        debug!(destination = %destination.display(), bytes, "copied archive");
        Ok(Upload {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key("/my/test/prefix/", "fpm", "2024-05-01T10:00:00.000Z", Codec::Gzip),
            "my/test/prefix/fpm/2024-05-01T10:00:00.000Z.gz"
        );
        assert_eq!(
            object_key("", "fpm", "stamp", Codec::Zstd),
            "fpm/stamp.zst"
        );
    }

    #[test]
    fn test_http_uploader_rejects_bad_endpoint() {
        let err = HttpUploader::new("s3.local", "bucket", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, UploadError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_http_uploader_puts_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.gz");
        std::fs::write(&path, b"archive-bytes").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/logs-bucket/prefix/web/stamp.gz")
            .match_header("content-length", "13")
            .match_body("archive-bytes")
            .with_status(200)
            .create_async()
            .await;

        let uploader = HttpUploader::new(server.url(), "logs-bucket", Duration::from_secs(5)).unwrap();
        let upload = uploader.upload(&path, "prefix/web/stamp.gz").await.unwrap();

        mock.assert_async().await;
        assert_eq!(upload.bytes, 13);
        assert_eq!(upload.key, "prefix/web/stamp.gz");
    }

    #[tokio::test]
    async fn test_http_uploader_reports_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.gz");
        std::fs::write(&path, b"x").unwrap();

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/logs-bucket/k.gz")
            .with_status(403)
            .with_body("AccessDenied")
            .create_async()
            .await;

        let uploader = HttpUploader::new(server.url(), "logs-bucket", Duration::from_secs(5)).unwrap();
        let err = uploader.upload(&path, "k.gz").await.unwrap_err();

        match err {
            UploadError::Rejected { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "AccessDenied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_uploader_copies_into_bucket_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("web.gz");
        std::fs::write(&archive, b"abc").unwrap();
        let root = dir.path().join("store");

        let uploader = LocalUploader::new(&root, "logs-bucket");
        let upload = uploader.upload(&archive, "prefix/web/stamp.gz").await.unwrap();

        assert_eq!(upload.bytes, 3);
        assert_eq!(
            std::fs::read(root.join("logs-bucket/prefix/web/stamp.gz")).unwrap(),
            b"abc"
        );
    }

    #[tokio::test]
    async fn test_local_uploader_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), "b");
        let err = uploader
            .upload(&dir.path().join("nope.gz"), "k.gz")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
    }
}
