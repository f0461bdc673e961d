pub mod download;
pub mod server;

pub use download::{unique_destination, DownloadTask};
pub use server::TransferServer;
