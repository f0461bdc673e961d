use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

use crate::core::models::{FileEntry, SharedFile};
use crate::utils::{Result, ShareError};

/// The live set of files this node offers. The transfer server resolves
/// every request against it at serve time, so removals take effect
/// immediately; the orchestrator mutates it behind the same lock.
#[derive(Clone, Default)]
pub struct ShareSet {
    files: Arc<RwLock<HashMap<String, SharedFile>>>,
}

impl ShareSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local file to the share set, generating its file_id.
    pub async fn add(
        &self,
        path: &Path,
        owner_ip: &str,
        owner_hostname: &str,
    ) -> Result<SharedFile> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ShareError::Io(format!("Failed to stat {}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(ShareError::Io(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ShareError::Io(format!("No filename in {}", path.display())))?;

        let file = SharedFile::create(
            filename,
            metadata.len(),
            owner_ip.to_string(),
            owner_hostname.to_string(),
            path.to_path_buf(),
        );

        let mut files = self.files.write().await;
        info!(
            "Sharing {} ({} bytes) as {}",
            file.filename, file.size, file.file_id
        );
        files.insert(file.file_id.clone(), file.clone());
        Ok(file)
    }

    pub async fn remove(&self, file_id: &str) -> bool {
        let mut files = self.files.write().await;
        match files.remove(file_id) {
            Some(file) => {
                info!("Unshared {} ({})", file.filename, file_id);
                true
            }
            None => {
                warn!("Unshare of unknown file_id: {}", file_id);
                false
            }
        }
    }

    /// Resolve a file_id to its backing path, if it is still shared and the
    /// file is still readable on disk.
    pub async fn resolve(&self, file_id: &str) -> Option<(PathBuf, u64)> {
        let path = {
            let files = self.files.read().await;
            files.get(file_id)?.local_path.clone()?
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some((path, meta.len())),
            _ => None,
        }
    }

    /// Wire-form snapshot for FILE_LIST broadcast.
    pub async fn entries(&self) -> Vec<FileEntry> {
        let files = self.files.read().await;
        let mut entries: Vec<FileEntry> = files.values().map(|f| f.to_entry()).collect();
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        entries
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_add_resolve_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let shares = ShareSet::new();
        let file = shares.add(&path, "192.168.1.5", "alice").await.unwrap();
        assert_eq!(file.size, 11);
        assert_eq!(file.file_id.len(), 12);

        let (resolved, size) = shares.resolve(&file.file_id).await.unwrap();
        assert_eq!(resolved, path);
        assert_eq!(size, 11);

        assert!(shares.remove(&file.file_id).await);
        assert!(shares.resolve(&file.file_id).await.is_none());
        assert!(shares.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_reflects_deleted_backing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        tokio::fs::write(&path, b"soon gone").await.unwrap();

        let shares = ShareSet::new();
        let file = shares.add(&path, "192.168.1.5", "alice").await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        // Still listed, but no longer servable.
        assert_eq!(shares.len().await, 1);
        assert!(shares.resolve(&file.file_id).await.is_none());
    }

    #[tokio::test]
    async fn test_entries_carry_no_local_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let shares = ShareSet::new();
        shares.add(&path, "192.168.1.5", "alice").await.unwrap();

        let entries = shares.entries().await;
        assert_eq!(entries.len(), 1);
        let json = serde_json::to_string(&entries[0]).unwrap();
        assert!(!json.contains("local_path"));
    }

    #[tokio::test]
    async fn test_add_rejects_directory() {
        let dir = tempdir().unwrap();
        let shares = ShareSet::new();
        assert!(shares.add(dir.path(), "192.168.1.5", "alice").await.is_err());
    }
}
