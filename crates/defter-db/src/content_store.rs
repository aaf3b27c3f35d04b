//! Content store for uploaded source documents.
//!
//! Bytes are written once to a deterministic, human-auditable path:
//! `{tenant}/{client}/{period}/{doc_type}/{YYYYMMDD}/{upload_id}/{sanitized_filename}`.
//! The upload id segment is freshly generated per request, so concurrent
//! uploads never contend for the same path.
//!
//! ## Example
//!
//! ```rust,ignore
//! use defter_db::content_store::{ContentStore, FilesystemBackend};
//!
//! let store = ContentStore::new(FilesystemBackend::new("/var/lib/defter/uploads"));
//! let stored = store.store(&scope, DocType::Mizan, upload_id, "mizan.csv", &data).await?;
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use defter_core::{sanitize_filename, DocType, Error, Result, Scope};

/// Storage backend trait for different storage implementations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified relative path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified relative path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified relative path. Missing files are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified relative path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend rooted at a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(Error::Storage(format!(
                "refusing storage path outside the store: {:?}",
                path
            )));
        }
        Ok(self.base_path.join(relative))
    }

    /// Round-trip a probe file to catch permission or mount problems at startup.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let probe_dir = self.base_path.join(".health-check");
        let probe_file = probe_dir.join("probe.bin");

        fs::create_dir_all(&probe_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", probe_dir, e))?;

        let data = b"defter-storage-health-check";
        fs::write(&probe_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", probe_file, e))?;

        let read_back = fs::read(&probe_file)
            .await
            .map_err(|e| format!("read({:?}): {}", probe_file, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&probe_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", probe_file, e))?;
        let _ = fs::remove_dir(&probe_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            op = "write",
            storage_path = %path,
            size_bytes = data.len(),
            "Writing upload bytes"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(format!("create_dir_all({}): {}", parent.display(), e))
            })?;
        }

        // Atomic write: temp file + rename
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".partial");
        let temp_path = PathBuf::from(temp_name);

        if let Err(e) = write_temp_file(&temp_path, data).await {
            warn!(
                subsystem = "storage",
                component = "filesystem",
                op = "write",
                storage_path = %path,
                error = %e,
                "Write failed, removing temp file"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            warn!(
                subsystem = "storage",
                component = "filesystem",
                op = "rename",
                from = %temp_path.display(),
                error = %e,
                "Rename failed, removing temp file"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(format!(
                "rename({}): {}",
                full_path.display(),
                e
            )));
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

/// Write, fsync and chmod the temp file. The caller removes it on error.
async fn write_temp_file(temp_path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| Error::Storage(format!("create({}): {}", temp_path.display(), e)))?;
    file.write_all(data)
        .await
        .map_err(|e| Error::Storage(format!("write({}): {}", temp_path.display(), e)))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Storage(format!("sync({}): {}", temp_path.display(), e)))?;

    // rw-r--r--, never executable
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))
            .await
            .map_err(|e| Error::Storage(format!("chmod({}): {}", temp_path.display(), e)))?;
    }
    Ok(())
}

/// SHA-256 digest of `data` as `sha256:{64-char-hex}`.
pub fn compute_content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    format!("sha256:{}", hex::encode(digest))
}

/// Relative storage path for one upload.
pub fn generate_storage_path(
    scope: &Scope,
    doc_type: DocType,
    received_on: NaiveDate,
    upload_id: Uuid,
    original_filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}/{}",
        scope.tenant_id,
        scope.client_id,
        scope.period_id,
        doc_type,
        received_on.format("%Y%m%d"),
        upload_id.as_hyphenated(),
        sanitize_filename(original_filename)
    )
}

/// Result of persisting one upload's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub size_bytes: i64,
}

/// Content store: path layout on top of a [`StorageBackend`].
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn StorageBackend>,
}

impl ContentStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Persist bytes under the layout path for today's date.
    pub async fn store(
        &self,
        scope: &Scope,
        doc_type: DocType,
        upload_id: Uuid,
        original_filename: &str,
        data: &[u8],
    ) -> Result<StoredObject> {
        let path = generate_storage_path(
            scope,
            doc_type,
            Utc::now().date_naive(),
            upload_id,
            original_filename,
        );
        if let Err(e) = self.backend.write(&path, data).await {
            // The backend may have left partial bytes behind
            self.discard(&path).await;
            return Err(e);
        }
        Ok(StoredObject {
            path,
            size_bytes: data.len() as i64,
        })
    }

    /// Best-effort removal of a file written by a pipeline run that did not
    /// complete. Failures are logged, never returned.
    pub async fn discard(&self, path: &str) {
        if let Err(e) = self.backend.delete(path).await {
            warn!(
                subsystem = "storage",
                component = "content_store",
                op = "discard",
                storage_path = %path,
                error = %e,
                "Failed to remove orphaned upload file"
            );
        }
    }
}
