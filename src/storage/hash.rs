use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::network::protocol::CHUNK_SIZE;
use crate::utils::{Result, ShareError};

pub struct HashUtils;

impl HashUtils {
    /// Whole-file SHA-256 via a sequential chunked read. Used by the
    /// transfer server before every serve and by the download client after
    /// every receive.
    pub async fn hash_file(path: &Path) -> Result<[u8; 32]> {
        let mut file = File::open(path)
            .await
            .map_err(|e| ShareError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hasher.finalize().into())
    }

    pub fn hash_data(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    pub fn to_hex(digest: &[u8; 32]) -> String {
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_hash_matches_in_memory_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        let file_digest = HashUtils::hash_file(&path).await.unwrap();
        assert_eq!(file_digest, HashUtils::hash_data(&content));
    }

    #[tokio::test]
    async fn test_single_byte_change_alters_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut content = vec![0xABu8; 4096];
        tokio::fs::write(&path, &content).await.unwrap();
        let before = HashUtils::hash_file(&path).await.unwrap();

        content[2000] ^= 0x01;
        tokio::fs::write(&path, &content).await.unwrap();
        let after = HashUtils::hash_file(&path).await.unwrap();

        assert_ne!(before, after);
    }
}
