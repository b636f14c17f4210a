use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Blob storage for project attachments.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the bytes under `key` and returns a public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String>;
}

/// Files on local disk, served back by the router under `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| AppError::internal(format!("failed to prepare upload directory: {err}")))?;
        }

        let size = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| AppError::internal(format!("failed to store upload: {err}")))?;

        tracing::info!(key = %key, size, content_type = %content_type, "object stored");
        Ok(format!("{}/uploads/{}", self.public_base_url, key))
    }
}

/// `docs/<uuid>_<name>` with the client-supplied name reduced to a safe basename.
pub fn object_key(filename: &str) -> String {
    format!("docs/{}_{}", Uuid::new_v4().simple(), sanitize_filename(filename))
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
