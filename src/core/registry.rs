use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::models::{FileEntry, Peer};

/// Live view of known peers, keyed by IP. Mutated by discovery and control
/// events, read concurrently for broadcast fan-out; all access goes through
/// the lock.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery sighting. Returns true when the peer is new.
    pub async fn upsert(&self, hostname: &str, ip: &str, control_port: u16) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get_mut(ip) {
            Some(peer) => {
                peer.hostname = hostname.to_string();
                peer.control_port = control_port;
                peer.mark_seen();
                false
            }
            None => {
                peers.insert(
                    ip.to_string(),
                    Peer::new(hostname.to_string(), ip.to_string(), control_port),
                );
                info!("Peer registered: {} ({})", hostname, ip);
                true
            }
        }
    }

    pub async fn remove(&self, ip: &str) -> bool {
        let mut peers = self.peers.write().await;
        if peers.remove(ip).is_some() {
            info!("Peer removed: {}", ip);
            true
        } else {
            false
        }
    }

    /// Replace a peer's file snapshot wholesale. A FILE_LIST can outrun the
    /// discovery event for a brand-new peer, so an unknown sender is
    /// registered implicitly rather than dropped.
    pub async fn set_files(&self, hostname: &str, ip: &str, control_port: u16, files: Vec<FileEntry>) {
        let mut peers = self.peers.write().await;
        let peer = peers.entry(ip.to_string()).or_insert_with(|| {
            debug!("Implicitly registering {} from FILE_LIST", ip);
            Peer::new(hostname.to_string(), ip.to_string(), control_port)
        });
        peer.hostname = hostname.to_string();
        peer.shared_files = files;
        peer.mark_seen();
    }

    pub async fn get(&self, ip: &str) -> Option<Peer> {
        self.peers.read().await.get(ip).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Peer> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> FileEntry {
        FileEntry {
            file_id: id.to_string(),
            filename: name.to_string(),
            size: 10,
            owner_ip: "192.168.1.9".to_string(),
            owner_hostname: "carol".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_reports_new_only_once() {
        let registry = PeerRegistry::new();
        assert!(registry.upsert("bob", "192.168.1.7", 37711).await);
        assert!(!registry.upsert("bob", "192.168.1.7", 37711).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_file_list_replaces_not_merges() {
        let registry = PeerRegistry::new();
        registry.upsert("carol", "192.168.1.9", 37711).await;

        registry
            .set_files("carol", "192.168.1.9", 37711, vec![entry("aaa111aaa111", "a.txt")])
            .await;
        registry
            .set_files("carol", "192.168.1.9", 37711, vec![entry("bbb222bbb222", "b.txt")])
            .await;

        let peer = registry.get("192.168.1.9").await.unwrap();
        assert_eq!(peer.shared_files.len(), 1);
        assert_eq!(peer.shared_files[0].file_id, "bbb222bbb222");
    }

    #[tokio::test]
    async fn test_file_list_registers_unknown_peer_implicitly() {
        let registry = PeerRegistry::new();
        registry
            .set_files("dave", "192.168.1.11", 37711, vec![entry("ccc333ccc333", "c.txt")])
            .await;

        let peer = registry.get("192.168.1.11").await.unwrap();
        assert_eq!(peer.hostname, "dave");
        assert_eq!(peer.shared_files.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = PeerRegistry::new();
        registry.upsert("bob", "192.168.1.7", 37711).await;
        assert!(registry.remove("192.168.1.7").await);
        assert!(!registry.remove("192.168.1.7").await);
        assert!(registry.is_empty().await);
    }
}
