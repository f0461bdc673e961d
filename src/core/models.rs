use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A file this node offers to the network. `local_path` stays on the owning
/// node and never crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFile {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub owner_ip: String,
    pub owner_hostname: String,
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

/// Wire form of a shared file, as carried inside FILE_LIST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub owner_ip: String,
    pub owner_hostname: String,
}

impl SharedFile {
    pub fn create(
        filename: String,
        size: u64,
        owner_ip: String,
        owner_hostname: String,
        local_path: PathBuf,
    ) -> Self {
        Self {
            file_id: generate_file_id(),
            filename,
            size,
            owner_ip,
            owner_hostname,
            local_path: Some(local_path),
        }
    }

    pub fn to_entry(&self) -> FileEntry {
        FileEntry {
            file_id: self.file_id.clone(),
            filename: self.filename.clone(),
            size: self.size,
            owner_ip: self.owner_ip.clone(),
            owner_hostname: self.owner_hostname.clone(),
        }
    }
}

/// Opaque 12-hex-char file identifier, generated once per shared file.
pub fn generate_file_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Another node on the broadcast domain. Keyed by `ip` in the registry.
#[derive(Debug, Clone)]
pub struct Peer {
    pub hostname: String,
    pub ip: String,
    pub control_port: u16,
    pub last_seen: Instant,
    pub shared_files: Vec<FileEntry>,
}

impl Peer {
    pub fn new(hostname: String, ip: String, control_port: u16) -> Self {
        Self {
            hostname,
            ip,
            control_port,
            last_seen: Instant::now(),
            shared_files: Vec::new(),
        }
    }

    pub fn is_alive(&self, alive_window: Duration) -> bool {
        self.last_seen.elapsed() < alive_window
    }

    pub fn mark_seen(&mut self) {
        self.last_seen = Instant::now();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender_hostname: String,
    pub sender_ip: String,
    pub text: String,
    pub timestamp: f64,
}

impl ChatMessage {
    pub fn new(sender_hostname: String, sender_ip: String, text: String) -> Self {
        Self {
            sender_hostname,
            sender_ip,
            text,
            timestamp: unix_timestamp(),
        }
    }
}

/// Seconds since the Unix epoch, as carried in CHAT messages.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_is_12_hex_chars() {
        let id = generate_file_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_ids_are_unique() {
        let a = generate_file_id();
        let b = generate_file_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_local_path_not_serialized() {
        let file = SharedFile::create(
            "report.pdf".to_string(),
            1024,
            "192.168.1.5".to_string(),
            "alice".to_string(),
            PathBuf::from("/home/alice/report.pdf"),
        );
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("local_path"));
        assert!(!json.contains("/home/alice"));
    }

    #[test]
    fn test_peer_liveness_window() {
        let mut peer = Peer::new("bob".to_string(), "192.168.1.7".to_string(), 37711);
        assert!(peer.is_alive(Duration::from_secs(10)));
        peer.last_seen = Instant::now() - Duration::from_secs(11);
        assert!(!peer.is_alive(Duration::from_secs(10)));
        peer.mark_seen();
        assert!(peer.is_alive(Duration::from_secs(10)));
    }
}
