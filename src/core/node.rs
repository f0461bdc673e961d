//! The orchestrator: owns the peer registry and share set, wires the
//! discovery, control, and transfer services together, and turns their raw
//! signals into the public event stream plus the fan-out policies
//! (FILE_LIST on share-set changes and to newly seen peers, chat to
//! everyone).

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use crate::core::config::Config;
use crate::core::events::{EventSender, NodeEvent};
use crate::core::models::{ChatMessage, SharedFile};
use crate::core::registry::PeerRegistry;
use crate::network::control::{self, ControlEvent, ControlServer};
use crate::network::discovery::{DiscoveryEvent, DiscoveryService};
use crate::network::protocol::Message;
use crate::storage::ShareSet;
use crate::transfer::{DownloadTask, TransferServer};
use crate::utils::{NetUtils, Result, ShareError};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub struct Node {
    config: Config,
    local_ip: String,
    registry: PeerRegistry,
    shares: ShareSet,
    events: EventSender,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    downloads: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    handles: Vec<JoinHandle<()>>,
    control_port: u16,
    transfer_port: u16,
}

impl Node {
    pub fn new(config: Config, events: EventSender) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let control_port = config.control_port;
        let transfer_port = config.transfer_port;
        Self {
            local_ip: NetUtils::primary_local_ip(),
            config,
            registry: PeerRegistry::new(),
            shares: ShareSet::new(),
            events,
            stop_tx,
            stop_rx,
            downloads: Arc::new(Mutex::new(HashMap::new())),
            handles: Vec::new(),
            control_port,
            transfer_port,
        }
    }

    /// Bind and spawn all three listeners plus the event pump. Any bind
    /// failure aborts startup and propagates.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting node '{}' ({}) - discovery:{} control:{} transfer:{}",
            self.config.hostname,
            self.local_ip,
            self.config.discovery_port,
            self.config.control_port,
            self.config.transfer_port
        );

        let (disc_tx, disc_rx) = mpsc::unbounded_channel();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();

        let discovery_handle = DiscoveryService::start(&self.config, disc_tx, self.stop_rx.clone())?;

        let (control_port, control_handle) =
            ControlServer::start(self.config.control_port, ctrl_tx, self.stop_rx.clone()).await?;
        self.control_port = control_port;

        let (transfer_port, transfer_handle) = TransferServer::start(
            self.config.transfer_port,
            self.shares.clone(),
            self.events.clone(),
            self.stop_rx.clone(),
        )
        .await?;
        self.transfer_port = transfer_port;

        let pump_handle = self.spawn_event_pump(disc_rx, ctrl_rx);

        self.handles = vec![
            discovery_handle,
            control_handle,
            transfer_handle,
            pump_handle,
        ];
        Ok(())
    }

    /// Translate service signals into registry updates and public events.
    fn spawn_event_pump(
        &self,
        mut disc_rx: mpsc::UnboundedReceiver<DiscoveryEvent>,
        mut ctrl_rx: mpsc::UnboundedReceiver<ControlEvent>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let shares = self.shares.clone();
        let events = self.events.clone();
        let hostname = self.config.hostname.clone();
        let default_control_port = self.config.control_port;
        let mut stop = self.stop_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    event = disc_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            DiscoveryEvent::PeerSeen { hostname: peer_host, ip, control_port } => {
                                let is_new = registry.upsert(&peer_host, &ip, control_port).await;
                                if is_new {
                                    let _ = events.send(NodeEvent::PeerAppeared {
                                        hostname: peer_host,
                                        ip: ip.clone(),
                                        control_port,
                                    });
                                    // Late joiners must not wait for the
                                    // next share-set mutation to learn what
                                    // is available.
                                    let list = Message::file_list(&hostname, shares.entries().await);
                                    if let Err(e) =
                                        control::send_best_effort(&ip, control_port, &list).await
                                    {
                                        debug!("Proactive FILE_LIST to {} failed: {}", ip, e);
                                    }
                                }
                            }
                            DiscoveryEvent::PeerGone { ip } => {
                                registry.remove(&ip).await;
                                let _ = events.send(NodeEvent::PeerGone { ip });
                            }
                        }
                    }
                    event = ctrl_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            ControlEvent::FileList { hostname: peer_host, ip, files } => {
                                registry
                                    .set_files(&peer_host, &ip, default_control_port, files.clone())
                                    .await;
                                let _ = events.send(NodeEvent::FileListReceived {
                                    hostname: peer_host,
                                    ip,
                                    files,
                                });
                            }
                            ControlEvent::Chat(chat) => {
                                let _ = events.send(NodeEvent::ChatReceived(chat));
                            }
                        }
                    }
                }
            }
            debug!("Event pump exited");
        })
    }

    /// Add a local file to the share set and announce the new list.
    pub async fn share_file(&self, path: &Path) -> Result<SharedFile> {
        let file = self
            .shares
            .add(path, &self.local_ip, &self.config.hostname)
            .await?;
        self.announce().await;
        Ok(file)
    }

    /// Drop a file from the share set and announce the new list.
    pub async fn unshare(&self, file_id: &str) -> bool {
        let removed = self.shares.remove(file_id).await;
        if removed {
            self.announce().await;
        }
        removed
    }

    /// Broadcast the current FILE_LIST to every registered peer.
    /// Best-effort: unreachable peers are skipped, not retried.
    pub async fn announce(&self) {
        let list = Message::file_list(&self.config.hostname, self.shares.entries().await);
        for peer in self.registry.snapshot().await {
            if let Err(e) = control::send_best_effort(&peer.ip, peer.control_port, &list).await {
                debug!("FILE_LIST to {} failed: {}", peer.ip, e);
            }
        }
    }

    /// Send a chat line to every registered peer and echo it locally on the
    /// event stream for display.
    pub async fn send_chat(&self, text: &str) -> ChatMessage {
        let chat = ChatMessage::new(
            self.config.hostname.clone(),
            self.local_ip.clone(),
            text.to_string(),
        );
        let msg = Message::Chat {
            hostname: chat.sender_hostname.clone(),
            ip: chat.sender_ip.clone(),
            text: chat.text.clone(),
            timestamp: chat.timestamp,
        };

        for peer in self.registry.snapshot().await {
            if let Err(e) = control::send_best_effort(&peer.ip, peer.control_port, &msg).await {
                debug!("CHAT to {} failed: {}", peer.ip, e);
            }
        }

        let _ = self.events.send(NodeEvent::ChatReceived(chat.clone()));
        chat
    }

    /// Kick off a download task against the owning peer. `resume_offset` is
    /// the byte count already sitting in the local `.part` file, 0 for a
    /// fresh download.
    pub async fn start_download(
        &self,
        file_id: &str,
        filename: &str,
        peer_ip: &str,
        dest_dir: Option<PathBuf>,
        resume_offset: u64,
    ) -> Result<()> {
        let save_dir = dest_dir.unwrap_or_else(|| self.config.download_dir.clone());
        tokio::fs::create_dir_all(&save_dir)
            .await
            .map_err(|e| ShareError::Io(format!("Cannot create {}: {}", save_dir.display(), e)))?;

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut downloads = self.downloads.lock().await;
            // One active task per file_id; a second start would alias the
            // first task's cancel flag.
            if downloads.contains_key(file_id) {
                return Err(ShareError::InvalidRequest(format!(
                    "download already active for {}",
                    file_id
                )));
            }
            downloads.insert(file_id.to_string(), cancel.clone());
        }

        let handle = DownloadTask::new(
            file_id.to_string(),
            filename.to_string(),
            peer_ip.to_string(),
            self.config.transfer_port,
            save_dir,
            resume_offset,
            cancel,
            self.events.clone(),
        )
        .spawn();

        // Drop the cancel flag once the task reaches its terminal outcome.
        let downloads = self.downloads.clone();
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            let _ = handle.await;
            downloads.lock().await.remove(&file_id);
        });

        Ok(())
    }

    /// Cooperative cancel: flips the task's flag, observed at the next
    /// chunk boundary. Returns false when no such download is active.
    pub async fn cancel_download(&self, file_id: &str) -> bool {
        let downloads = self.downloads.lock().await;
        match downloads.get(file_id) {
            Some(flag) => {
                info!("Cancelling download: {}", file_id);
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => {
                warn!("Cancel for unknown download: {}", file_id);
                false
            }
        }
    }

    /// Graceful shutdown: signal every loop, then wait out a bounded grace
    /// period. Discovery broadcasts its BYE on the way down.
    pub async fn stop(&mut self) {
        info!("Stopping node '{}'", self.config.hostname);
        let _ = self.stop_tx.send(true);

        for handle in self.handles.drain(..) {
            if timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("A service loop did not stop within the grace period");
            }
        }
        info!("Node stopped");
    }

    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn transfer_port(&self) -> u16 {
        self.transfer_port
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn shares(&self) -> &ShareSet {
        &self.shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::event_channel;
    use crate::core::models::FileEntry;
    use tempfile::tempdir;

    fn test_config() -> Config {
        // Ephemeral ports everywhere so parallel tests never collide.
        Config {
            hostname: "test-node".to_string(),
            discovery_port: 0,
            control_port: 0,
            transfer_port: 0,
            download_dir: PathBuf::from("./downloads"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_incoming_file_list_registers_peer_and_forwards() {
        let (event_tx, mut events) = event_channel();
        let mut node = Node::new(test_config(), event_tx);
        node.start().await.unwrap();

        let files = vec![FileEntry {
            file_id: "abcdefabcdef".to_string(),
            filename: "notes.txt".to_string(),
            size: 5,
            owner_ip: "127.0.0.1".to_string(),
            owner_hostname: "remote".to_string(),
        }];
        control::send_best_effort(
            "127.0.0.1",
            node.control_port(),
            &Message::file_list("remote", files.clone()),
        )
        .await
        .unwrap();

        match events.recv().await.unwrap() {
            NodeEvent::FileListReceived { hostname, files: got, .. } => {
                assert_eq!(hostname, "remote");
                assert_eq!(got, files);
            }
            other => panic!("expected FileListReceived, got {:?}", other),
        }

        // The sender was unknown; the FILE_LIST registered it implicitly.
        let peer = node.registry().get("127.0.0.1").await.unwrap();
        assert_eq!(peer.shared_files.len(), 1);

        node.stop().await;
    }

    #[tokio::test]
    async fn test_incoming_chat_is_forwarded() {
        let (event_tx, mut events) = event_channel();
        let mut node = Node::new(test_config(), event_tx);
        node.start().await.unwrap();

        control::send_best_effort(
            "127.0.0.1",
            node.control_port(),
            &Message::Chat {
                hostname: "remote".to_string(),
                ip: "192.168.1.42".to_string(),
                text: "anyone here?".to_string(),
                timestamp: 1724700000.0,
            },
        )
        .await
        .unwrap();

        match events.recv().await.unwrap() {
            NodeEvent::ChatReceived(chat) => {
                assert_eq!(chat.sender_hostname, "remote");
                assert_eq!(chat.text, "anyone here?");
            }
            other => panic!("expected ChatReceived, got {:?}", other),
        }

        node.stop().await;
    }

    #[tokio::test]
    async fn test_sent_chat_is_echoed_locally() {
        let (event_tx, mut events) = event_channel();
        let mut node = Node::new(test_config(), event_tx);
        node.start().await.unwrap();

        let sent = node.send_chat("hello lan").await;
        assert_eq!(sent.text, "hello lan");

        match events.recv().await.unwrap() {
            NodeEvent::ChatReceived(chat) => assert_eq!(chat, sent),
            other => panic!("expected local chat echo, got {:?}", other),
        }

        node.stop().await;
    }

    #[tokio::test]
    async fn test_share_and_unshare_mutate_share_set() {
        let (event_tx, _events) = event_channel();
        let mut node = Node::new(test_config(), event_tx);
        node.start().await.unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let file = node.share_file(&path).await.unwrap();
        assert_eq!(node.shares().len().await, 1);
        assert!(node.unshare(&file.file_id).await);
        assert!(node.shares().is_empty().await);
        assert!(!node.unshare(&file.file_id).await);

        node.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_unknown_download_is_false() {
        let (event_tx, _events) = event_channel();
        let node = Node::new(test_config(), event_tx);
        assert!(!node.cancel_download("nosuchfileid").await);
    }

    #[tokio::test]
    async fn test_second_download_of_same_file_is_rejected_while_active() {
        // Accept the first task's connection and hold it open without
        // answering, keeping the download in flight for the whole test.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let (event_tx, _events) = event_channel();
        let mut config = test_config();
        config.transfer_port = port;
        let node = Node::new(config, event_tx);

        let dir = tempdir().unwrap();
        node.start_download(
            "aaaabbbbcccc",
            "x.bin",
            "127.0.0.1",
            Some(dir.path().to_path_buf()),
            0,
        )
        .await
        .unwrap();

        let second = node
            .start_download(
                "aaaabbbbcccc",
                "x.bin",
                "127.0.0.1",
                Some(dir.path().to_path_buf()),
                0,
            )
            .await;
        assert!(matches!(second, Err(ShareError::InvalidRequest(_))));

        // The first task's flag is still the one on record.
        assert!(node.cancel_download("aaaabbbbcccc").await);
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let (event_tx, _events) = event_channel();
        let mut node = Node::new(test_config(), event_tx);
        node.start().await.unwrap();

        let begun = std::time::Instant::now();
        node.stop().await;
        assert!(begun.elapsed() < SHUTDOWN_GRACE + Duration::from_secs(1));
    }
}
