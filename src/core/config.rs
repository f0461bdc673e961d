use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DISCOVERY_PORT: u16 = 37710;
pub const DEFAULT_CONTROL_PORT: u16 = 37711;
pub const DEFAULT_TRANSFER_PORT: u16 = 37712;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub hostname: String,
    pub discovery_port: u16,
    pub control_port: u16,
    pub transfer_port: u16,
    pub download_dir: PathBuf,
    /// How often a HELLO broadcast goes out.
    #[serde(with = "duration_secs")]
    pub hello_interval: Duration,
    /// Silence longer than this evicts a peer.
    #[serde(with = "duration_secs")]
    pub alive_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            transfer_port: DEFAULT_TRANSFER_PORT,
            download_dir: PathBuf::from("./downloads"),
            hello_interval: Duration::from_secs(3),
            alive_window: Duration::from_secs(10),
        }
    }
}

pub fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
