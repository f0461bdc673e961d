pub mod config;
pub mod events;
pub mod models;
pub mod node;
pub mod registry;

pub use config::Config;
pub use events::{event_channel, EventReceiver, EventSender, NodeEvent};
pub use models::{ChatMessage, FileEntry, Peer, SharedFile};
pub use node::Node;
pub use registry::PeerRegistry;
