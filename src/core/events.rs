use tokio::sync::mpsc;

use crate::core::models::{ChatMessage, FileEntry};

/// Everything the core reports to its consumer (UI, CLI, tests). Delivered
/// over an unbounded channel; the consumer owns marshaling onto whatever
/// thread holds presentation state.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    PeerAppeared {
        hostname: String,
        ip: String,
        control_port: u16,
    },
    PeerGone {
        ip: String,
    },
    FileListReceived {
        hostname: String,
        ip: String,
        files: Vec<FileEntry>,
    },
    ChatReceived(ChatMessage),
    TransferStarted {
        file_id: String,
        requester_ip: String,
    },
    DownloadProgress {
        file_id: String,
        downloaded: u64,
        total: u64,
    },
    DownloadCompleted {
        file_id: String,
        saved_path: std::path::PathBuf,
    },
    DownloadFailed {
        file_id: String,
        reason: String,
    },
    DownloadCancelled {
        file_id: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<NodeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NodeEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
