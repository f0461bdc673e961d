//! Client side of the binary transfer protocol: one task per download,
//! resumable via a byte offset, verified end-to-end against the server's
//! whole-file digest. Interrupted downloads leave a `.part` file behind as
//! the resume point.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::core::events::{EventSender, NodeEvent};
use crate::network::protocol::CHUNK_SIZE;
use crate::storage::HashUtils;
use crate::transfer::server::{DIGEST_LEN, FILE_ID_LEN, REQUEST_SIZE};
use crate::utils::{Result, ShareError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DownloadTask {
    pub file_id: String,
    pub filename: String,
    pub peer_ip: String,
    pub transfer_port: u16,
    pub save_dir: PathBuf,
    pub offset: u64,
    cancel: Arc<AtomicBool>,
    events: EventSender,
}

impl DownloadTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_id: String,
        filename: String,
        peer_ip: String,
        transfer_port: u16,
        save_dir: PathBuf,
        offset: u64,
        cancel: Arc<AtomicBool>,
        events: EventSender,
    ) -> Self {
        Self {
            file_id,
            filename,
            peer_ip,
            transfer_port,
            save_dir,
            offset,
            cancel,
            events,
        }
    }

    /// Run the download to completion on its own task. Exactly one terminal
    /// event comes out: completed, failed, or cancelled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let file_id = self.file_id.clone();
            let events = self.events.clone();
            match self.run().await {
                Ok(saved_path) => {
                    info!("Download completed: {} -> {}", file_id, saved_path.display());
                    let _ = events.send(NodeEvent::DownloadCompleted {
                        file_id,
                        saved_path,
                    });
                }
                Err(ShareError::Cancelled) => {
                    info!("Download cancelled: {}", file_id);
                    let _ = events.send(NodeEvent::DownloadCancelled { file_id });
                }
                Err(e) => {
                    warn!("Download failed: {}: {}", file_id, e);
                    let _ = events.send(NodeEvent::DownloadFailed {
                        file_id,
                        reason: e.to_string(),
                    });
                }
            }
        })
    }

    async fn run(&self) -> Result<PathBuf> {
        if self.file_id.len() != FILE_ID_LEN || !self.file_id.is_ascii() {
            return Err(ShareError::InvalidRequest(format!(
                "file_id must be {} ASCII chars: {:?}",
                FILE_ID_LEN, self.file_id
            )));
        }

        let addr = format!("{}:{}", self.peer_ip, self.transfer_port);
        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ShareError::ConnectionFailed(format!("Connect timeout to {}", addr)))?
            .map_err(|e| ShareError::ConnectionFailed(format!("Connect to {}: {}", addr, e)))?;
        debug!("Connected to {} for {}", addr, self.file_id);

        let mut request = [0u8; REQUEST_SIZE];
        request[..FILE_ID_LEN].copy_from_slice(self.file_id.as_bytes());
        request[FILE_ID_LEN..].copy_from_slice(&self.offset.to_be_bytes());
        stream.write_all(&request).await?;

        let mut size_buf = [0u8; 8];
        stream.read_exact(&mut size_buf).await.map_err(|e| {
            ShareError::IncompleteTransfer(format!("No response header: {}", e))
        })?;
        let total_size = u64::from_be_bytes(size_buf);
        if total_size == 0 {
            // Not-found sentinel; the server sends no digest after it.
            return Err(ShareError::FileNotFound(self.file_id.clone()));
        }

        let mut expected_digest = [0u8; DIGEST_LEN];
        stream.read_exact(&mut expected_digest).await.map_err(|e| {
            ShareError::IncompleteTransfer(format!("No checksum header: {}", e))
        })?;

        let remaining = total_size.checked_sub(self.offset).ok_or_else(|| {
            ShareError::InvalidRequest(format!(
                "Resume offset {} beyond file size {}",
                self.offset, total_size
            ))
        })?;

        let save_path = self.save_dir.join(&self.filename);
        let temp_path = part_path(&save_path);
        self.receive_body(&mut stream, &temp_path, total_size, remaining)
            .await?;
        drop(stream);

        // Verify over the complete local content, resumed prefix included.
        let actual_digest = HashUtils::hash_file(&temp_path).await?;
        if actual_digest != expected_digest {
            return Err(ShareError::ChecksumMismatch(format!(
                "{}: expected {}, got {}",
                self.file_id,
                HashUtils::to_hex(&expected_digest),
                HashUtils::to_hex(&actual_digest)
            )));
        }

        let final_path = unique_destination(&save_path);
        fs::rename(&temp_path, &final_path).await?;
        Ok(final_path)
    }

    async fn receive_body(
        &self,
        stream: &mut TcpStream,
        temp_path: &Path,
        total_size: u64,
        mut remaining: u64,
    ) -> Result<()> {
        let mut file = if self.offset > 0 {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(temp_path)
                .await?
        } else {
            File::create(temp_path).await?
        };

        let mut downloaded = self.offset;
        let mut buf = vec![0u8; CHUNK_SIZE];

        while remaining > 0 {
            // Cooperative cancel, once per chunk. The .part file stays put
            // so a later attempt can resume from it.
            if self.cancel.load(Ordering::SeqCst) {
                return Err(ShareError::Cancelled);
            }

            let to_read = remaining.min(CHUNK_SIZE as u64) as usize;
            let n = stream.read(&mut buf[..to_read]).await?;
            if n == 0 {
                return Err(ShareError::IncompleteTransfer(format!(
                    "Connection closed at {}/{} bytes",
                    downloaded, total_size
                )));
            }

            file.write_all(&buf[..n]).await?;
            downloaded += n as u64;
            remaining -= n as u64;

            let _ = self.events.send(NodeEvent::DownloadProgress {
                file_id: self.file_id.clone(),
                downloaded,
                total: total_size,
            });
        }

        file.flush().await?;
        Ok(())
    }
}

fn part_path(save_path: &Path) -> PathBuf {
    let mut name = save_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".part");
    save_path.with_file_name(name)
}

/// Never overwrite: if `report.pdf` is taken, probe `report_1.pdf`,
/// `report_2.pdf`, ... upward until a free name appears.
pub fn unique_destination(save_path: &Path) -> PathBuf {
    if !save_path.exists() {
        return save_path.to_path_buf();
    }

    let stem = save_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = save_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut i = 1;
    loop {
        let candidate = save_path.with_file_name(format!("{}_{}{}", stem, i, ext));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}
