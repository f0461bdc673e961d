pub mod error;
pub mod logger;
pub mod net;

pub use error::{Result, ShareError};
pub use logger::setup_logging;
pub use net::NetUtils;
