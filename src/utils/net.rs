use log::warn;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

use crate::utils::{Result, ShareError};

pub struct NetUtils;

impl NetUtils {
    /// Create a broadcast-capable UDP socket with SO_REUSEADDR
    /// (and SO_REUSEPORT on Unix where available).
    pub fn create_broadcast_udp_socket(addr: SocketAddr) -> Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| ShareError::BindFailure(format!("Failed to create socket: {}", e)))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ShareError::BindFailure(format!("Failed to set reuse_address: {}", e)))?;

        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        {
            if let Err(e) = socket.set_reuse_port(true) {
                warn!("Could not set SO_REUSEPORT (not critical): {}", e);
            }
        }

        socket
            .set_broadcast(true)
            .map_err(|e| ShareError::BindFailure(format!("Failed to set broadcast: {}", e)))?;

        socket
            .bind(&addr.into())
            .map_err(|e| ShareError::BindFailure(format!("Failed to bind to {}: {}", addr, e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| ShareError::BindFailure(format!("Failed to set nonblocking: {}", e)))?;

        UdpSocket::from_std(socket.into())
            .map_err(|e| ShareError::BindFailure(format!("Failed to convert socket: {}", e)))
    }

    /// Enumerate this machine's own IPv4 addresses, loopback included.
    /// Discovery uses the set to ignore its own broadcasts.
    pub fn local_ips() -> HashSet<IpAddr> {
        let mut ips: HashSet<IpAddr> = HashSet::new();
        ips.insert(IpAddr::from([127, 0, 0, 1]));

        match if_addrs::get_if_addrs() {
            Ok(interfaces) => {
                for iface in interfaces {
                    ips.insert(iface.ip());
                }
            }
            Err(e) => warn!("Failed to enumerate local interfaces: {}", e),
        }

        ips
    }

    /// Best IPv4 address to present to peers as our own.
    pub fn primary_local_ip() -> String {
        match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces
                .into_iter()
                .find(|i| !i.is_loopback() && i.ip().is_ipv4())
                .map(|i| i.ip().to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            Err(_) => "127.0.0.1".to_string(),
        }
    }
}
