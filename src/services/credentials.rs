// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local storage for the aggregator credential pair.
//!
//! One credential per running instance, kept under a fixed key. Writes
//! always replace the whole record.

use crate::error::AppError;
use crate::models::Credential;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Key the credential is stored under.
pub const STORAGE_KEY: &str = "nordigen";

/// Durable get/set of the single live credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, AppError>;

    /// Replace the stored credential.
    async fn store(&self, credential: &Credential) -> Result<(), AppError>;
}

/// Credential persisted as a JSON file named after [`STORAGE_KEY`].
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store the credential inside `dir` (created on first write).
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, AppError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &self.path, e)),
        };

        match serde_json::from_slice(&raw) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // Unreadable record: treat as absent so the next call re-authenticates
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding unreadable credential file"
                );
                Ok(None)
            }
        }
    }

    async fn store(&self, credential: &Credential) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error("create", dir, e))?;
        }

        let body = serde_json::to_vec_pretty(credential)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode credential: {}", e)))?;

        // Each writer renames its own temporary file into place; last rename wins
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("replace", &self.path, e));
        }

        Ok(())
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!(
        "Failed to {} {}: {}",
        action,
        path.display(),
        err
    ))
}

/// Credential held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `credential` already stored.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, AppError> {
        Ok(self.credential.read().await.clone())
    }

    async fn store(&self, credential: &Credential) -> Result<(), AppError> {
        *self.credential.write().await = Some(credential.clone());
        Ok(())
    }
}
