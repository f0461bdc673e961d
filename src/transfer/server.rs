//! Serving side of the binary transfer protocol. Requests are a fixed
//! 20-byte record (12 ASCII id bytes + u64 BE offset); the response is a
//! u64 BE total size plus a 32-byte SHA-256 digest, then raw file bytes
//! from the requested offset. A zero size is the not-found sentinel and no
//! digest follows it.

use log::{debug, info, warn};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::core::events::{EventSender, NodeEvent};
use crate::network::protocol::CHUNK_SIZE;
use crate::storage::{HashUtils, ShareSet};
use crate::utils::{Result, ShareError};

pub const FILE_ID_LEN: usize = 12;
pub const REQUEST_SIZE: usize = 20;
pub const DIGEST_LEN: usize = 32;

pub struct TransferServer;

impl TransferServer {
    /// Bind the transfer listener and spawn the accept loop. Bind failure
    /// is fatal and surfaces here.
    pub async fn start(
        port: u16,
        shares: ShareSet,
        events: EventSender,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(u16, JoinHandle<()>)> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
            .await
            .map_err(|e| ShareError::BindFailure(format!("Transfer port {}: {}", port, e)))?;
        let bound_port = listener.local_addr()?.port();
        info!("Transfer engine listening on TCP port {}", bound_port);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        debug!("Transfer stop signal observed");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let shares = shares.clone();
                                let events = events.clone();
                                let stop = stop.clone();
                                let ip = addr.ip().to_string();
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        Self::serve(stream, &ip, shares, events, stop).await
                                    {
                                        warn!("Serve to {} failed: {}", ip, e);
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("Transfer accept error: {}", e);
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
            info!("Transfer loop exited");
        });

        Ok((bound_port, handle))
    }

    async fn serve(
        mut stream: TcpStream,
        requester_ip: &str,
        shares: ShareSet,
        events: EventSender,
        stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut request = [0u8; REQUEST_SIZE];
        stream.read_exact(&mut request).await.map_err(|e| {
            ShareError::InvalidRequest(format!("Short request from {}: {}", requester_ip, e))
        })?;

        let file_id = std::str::from_utf8(&request[..FILE_ID_LEN])
            .map_err(|_| ShareError::InvalidRequest("Non-ASCII file id".to_string()))?
            .to_string();
        let offset = u64::from_be_bytes(request[FILE_ID_LEN..].try_into().expect("8 bytes"));
        debug!(
            "File request from {}: id={}, offset={}",
            requester_ip, file_id, offset
        );

        // Observers see activity before the checksum pass begins.
        let _ = events.send(NodeEvent::TransferStarted {
            file_id: file_id.clone(),
            requester_ip: requester_ip.to_string(),
        });

        // Late-bound lookup: a file unshared after startup is already gone
        // here, and a vanished backing file counts as absent too.
        let (path, size) = match shares.resolve(&file_id).await {
            Some(found) => found,
            None => {
                debug!("File not found: {}", file_id);
                stream.write_all(&0u64.to_be_bytes()).await?;
                return Ok(());
            }
        };

        // Whole-file digest, recomputed on every serve. Deliberately
        // uncached: correctness over speed.
        let digest = HashUtils::hash_file(&path).await?;

        let mut header = [0u8; 8 + DIGEST_LEN];
        header[..8].copy_from_slice(&size.to_be_bytes());
        header[8..].copy_from_slice(&digest);
        stream.write_all(&header).await?;

        info!(
            "Serving {} ({} bytes, sha256={}) to {} from offset {}",
            path.display(),
            size,
            HashUtils::to_hex(&digest),
            requester_ip,
            offset
        );

        let mut file = File::open(&path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut remaining = size.saturating_sub(offset);
        let mut buf = vec![0u8; CHUNK_SIZE];
        while remaining > 0 {
            if *stop.borrow() {
                debug!("Serve of {} aborted by shutdown", file_id);
                break;
            }
            let to_read = remaining.min(CHUNK_SIZE as u64) as usize;
            let n = file.read(&mut buf[..to_read]).await?;
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        stream.flush().await?;

        debug!("Serve complete: {}", file_id);
        Ok(())
    }
}
