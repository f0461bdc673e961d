//! LAN file sharing core: UDP broadcast peer discovery, a one-shot TCP
//! control channel for file lists and chat, and a binary TCP transfer
//! protocol with resume and whole-file checksum verification.

pub mod core;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use core::{event_channel, ChatMessage, Config, EventReceiver, EventSender, FileEntry, Node,
    NodeEvent, Peer, PeerRegistry, SharedFile};
pub use network::Message;
pub use storage::ShareSet;
pub use utils::{setup_logging, Result, ShareError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
