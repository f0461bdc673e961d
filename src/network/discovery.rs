//! UDP broadcast presence protocol. Every node shouts HELLO at the subnet
//! every few seconds and tracks who else is shouting; silence past the
//! liveness window or an explicit BYE evicts a peer.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::core::config::Config;
use crate::network::protocol::Message;
use crate::utils::{NetUtils, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    PeerSeen {
        hostname: String,
        ip: String,
        control_port: u16,
    },
    PeerGone {
        ip: String,
    },
}

/// Last-seen bookkeeping for the discovery loop. Factored out of the socket
/// loop so the eviction rules are testable with injected clocks.
#[derive(Default)]
pub struct PeerTracker {
    last_seen: HashMap<String, Instant>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_hello(&mut self, ip: &str, now: Instant) {
        self.last_seen.insert(ip.to_string(), now);
    }

    pub fn observe_bye(&mut self, ip: &str) {
        self.last_seen.remove(ip);
    }

    /// Evict every IP silent longer than `window`, returning the evicted
    /// set. Each absence is reported once; a later HELLO re-enters as a new
    /// sighting.
    pub fn sweep(&mut self, now: Instant, window: Duration) -> Vec<String> {
        let dead: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > window)
            .map(|(ip, _)| ip.clone())
            .collect();
        for ip in &dead {
            self.last_seen.remove(ip);
        }
        dead
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

pub struct DiscoveryService;

impl DiscoveryService {
    /// Bind the discovery socket and spawn the broadcast/receive loop. Bind
    /// failure is fatal and surfaces here; everything after is loop-local.
    pub fn start(
        config: &Config,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.discovery_port)
            .parse()
            .expect("static bind address");
        let socket = NetUtils::create_broadcast_udp_socket(bind_addr)?;
        info!("Discovery bound to UDP port {}", config.discovery_port);

        let hostname = config.hostname.clone();
        let control_port = config.control_port;
        let discovery_port = config.discovery_port;
        let hello_interval = config.hello_interval;
        let alive_window = config.alive_window;

        let handle = tokio::spawn(async move {
            Self::run_loop(
                socket,
                hostname,
                control_port,
                discovery_port,
                hello_interval,
                alive_window,
                events,
                &mut stop,
            )
            .await;
        });

        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        socket: UdpSocket,
        hostname: String,
        control_port: u16,
        discovery_port: u16,
        hello_interval: Duration,
        alive_window: Duration,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
        stop: &mut watch::Receiver<bool>,
    ) {
        let broadcast_addr: SocketAddr = format!("255.255.255.255:{}", discovery_port)
            .parse()
            .expect("static broadcast address");
        let local_ips = NetUtils::local_ips();
        debug!("Discovery self-filter set: {:?}", local_ips);

        let hello = Message::hello(&hostname, control_port);
        let mut tracker = PeerTracker::new();
        let mut ticker = interval(hello_interval);
        let mut buf = [0u8; 4096];

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    debug!("Discovery stop signal observed");
                    break;
                }
                _ = ticker.tick() => {
                    match serde_json::to_vec(&hello) {
                        Ok(payload) => {
                            if let Err(e) = socket.send_to(&payload, broadcast_addr).await {
                                warn!("HELLO broadcast failed: {}", e);
                            }
                        }
                        Err(e) => warn!("HELLO serialization failed: {}", e),
                    }

                    for ip in tracker.sweep(Instant::now(), alive_window) {
                        info!("Peer timeout: {}", ip);
                        let _ = events.send(DiscoveryEvent::PeerGone { ip });
                    }
                }
                recv = socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, addr)) => Self::handle_datagram(
                            &buf[..len],
                            addr,
                            &local_ips,
                            &mut tracker,
                            &events,
                        ),
                        Err(e) => {
                            // Anything but a timeout here means the socket
                            // is gone; the loop cannot recover.
                            warn!("Discovery receive error, stopping: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        // Graceful leave: one best-effort BYE so peers evict us immediately
        // instead of waiting out the liveness window.
        let bye = Message::bye(&hostname);
        match serde_json::to_vec(&bye) {
            Ok(payload) => match socket.send_to(&payload, broadcast_addr).await {
                Ok(_) => info!("Discovery sent BYE"),
                Err(e) => warn!("BYE broadcast failed: {}", e),
            },
            Err(e) => warn!("BYE serialization failed: {}", e),
        }

        info!("Discovery loop exited");
    }

    fn handle_datagram(
        data: &[u8],
        addr: SocketAddr,
        local_ips: &std::collections::HashSet<IpAddr>,
        tracker: &mut PeerTracker,
        events: &mpsc::UnboundedSender<DiscoveryEvent>,
    ) {
        let ip = addr.ip();
        if local_ips.contains(&ip) {
            return;
        }

        let msg: Message = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping unparseable datagram from {}: {}", ip, e);
                return;
            }
        };

        match msg {
            Message::Hello {
                hostname,
                control_port,
            } => {
                tracker.observe_hello(&ip.to_string(), Instant::now());
                let _ = events.send(DiscoveryEvent::PeerSeen {
                    hostname,
                    ip: ip.to_string(),
                    control_port,
                });
            }
            Message::Bye { hostname } => {
                info!("Received BYE from {} ({})", hostname, ip);
                tracker.observe_bye(&ip.to_string());
                let _ = events.send(DiscoveryEvent::PeerGone { ip: ip.to_string() });
            }
            other => {
                debug!("Ignoring {:?} on discovery port", other);
            }
        }
    }
}
