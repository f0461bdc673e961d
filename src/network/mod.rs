pub mod control;
pub mod discovery;
pub mod protocol;

pub use control::{send_best_effort, ControlEvent, ControlServer};
pub use discovery::{DiscoveryEvent, DiscoveryService, PeerTracker};
pub use protocol::{Message, CHUNK_SIZE, MAX_FRAME_SIZE};
