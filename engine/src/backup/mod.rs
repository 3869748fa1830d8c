//! File backup store
//!
//! Checkpoint discipline for a dataset stored in a single file. A checkpoint
//! is a byte-for-byte copy under `<root>/<run_id>/<file>.bak` plus a `blake3`
//! digest of its content. Restores are verified against the digest and
//! applied with an atomic rename, so they can be repeated safely.
//!
//! A store only restores checkpoints it created for the same run: the
//! locator must be the path this store derives from the checkpoint's run id.

use chrono::Utc;
use sdk::{BackupStore, Checkpoint, EngineError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::write_atomic;

const DIGEST_PREFIX: &str = "blake3:";

/// Backups of one live dataset file
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    live: PathBuf,
    root: PathBuf,
}

impl FileBackupStore {
    /// `live` is the dataset file; backups go under `root`
    pub fn new(live: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            live: live.into(),
            root: root.into(),
        }
    }

    /// Store rooted at `<data_dir>/backups`
    pub fn in_data_dir(live: impl Into<PathBuf>, data_dir: &Path) -> Self {
        Self::new(live, data_dir.join("backups"))
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, EngineError> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EngineError::Backup(format!("Invalid run id '{}'", run_id)));
        }
        Ok(self.root.join(run_id))
    }

    fn backup_path(&self, run_id: &str) -> Result<PathBuf, EngineError> {
        let file_name = self
            .live
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("dataset");
        Ok(self.run_dir(run_id)?.join(format!("{}.bak", file_name)))
    }
}

/// `blake3:<hex>` digest of a byte slice
pub fn digest(bytes: &[u8]) -> String {
    format!("{}{}", DIGEST_PREFIX, blake3::hash(bytes).to_hex())
}

impl BackupStore for FileBackupStore {
    fn snapshot(&self, run_id: &str) -> Result<Checkpoint, EngineError> {
        let bytes = fs::read(&self.live)
            .map_err(|e| EngineError::Backup(format!("Failed to read live dataset: {}", e)))?;

        let backup_path = self.backup_path(run_id)?;
        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Backup(format!("Failed to create backup directory: {}", e))
            })?;
        }
        fs::write(&backup_path, &bytes)
            .map_err(|e| EngineError::Backup(format!("Failed to write backup: {}", e)))?;

        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            locator: backup_path.to_string_lossy().into_owned(),
            digest: digest(&bytes),
            created_at: Utc::now().timestamp(),
        };

        info!(
            "Checkpoint taken for run {} ({} bytes, {})",
            run_id,
            bytes.len(),
            checkpoint.digest
        );
        Ok(checkpoint)
    }

    fn restore(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        let expected = self
            .backup_path(&checkpoint.run_id)
            .map_err(|_| EngineError::ForeignCheckpoint(checkpoint.run_id.clone()))?;
        if Path::new(&checkpoint.locator) != expected || !expected.is_file() {
            return Err(EngineError::ForeignCheckpoint(checkpoint.run_id.clone()));
        }

        let bytes = fs::read(&expected)
            .map_err(|e| EngineError::Restore(format!("Failed to read backup: {}", e)))?;
        let actual = digest(&bytes);
        if actual != checkpoint.digest {
            return Err(EngineError::DigestMismatch {
                expected: checkpoint.digest.clone(),
                actual,
            });
        }

        write_atomic(&self.live, &bytes)
            .map_err(|e| EngineError::Restore(format!("Failed to replace live dataset: {}", e)))?;

        info!("Dataset restored from checkpoint of run {}", checkpoint.run_id);
        Ok(())
    }

    fn discard(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        let dir = self.run_dir(&checkpoint.run_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Discarded checkpoint of run {}", checkpoint.run_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to discard checkpoint of run {}: {}", checkpoint.run_id, e);
                Err(EngineError::Backup(format!("Failed to discard backup: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_format() {
        let d = digest(b"[]");
        assert!(d.starts_with("blake3:"));
        assert_eq!(d.len(), DIGEST_PREFIX.len() + 64);
    }

    #[test]
    fn test_rejects_path_like_run_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileBackupStore::new(dir.path().join("d.json"), dir.path().join("backups"));
        assert!(matches!(store.run_dir("../escape"), Err(EngineError::Backup(_))));
        assert!(store.run_dir("run-1_a").is_ok());
    }
}
