//! TCP control channel: one framed message per connection, then close. A
//! send is a fresh connect/write/close with no acknowledgment; control
//! traffic is supplementary state sync, not guaranteed delivery.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::models::{ChatMessage, FileEntry};
use crate::network::protocol::{self, Message};
use crate::utils::{Result, ShareError};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum ControlEvent {
    FileList {
        hostname: String,
        ip: String,
        files: Vec<FileEntry>,
    },
    Chat(ChatMessage),
}

pub struct ControlServer;

impl ControlServer {
    /// Bind the control listener and spawn the accept loop. Bind failure is
    /// fatal and surfaces here.
    pub async fn start(
        port: u16,
        events: mpsc::UnboundedSender<ControlEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(u16, JoinHandle<()>)> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
            .await
            .map_err(|e| ShareError::BindFailure(format!("Control port {}: {}", port, e)))?;
        let bound_port = listener.local_addr()?.port();
        info!("Control channel listening on TCP port {}", bound_port);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        debug!("Control stop signal observed");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let events = events.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, addr.ip().to_string(), events)
                                        .await;
                                });
                            }
                            Err(e) => {
                                warn!("Control accept error: {}", e);
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
            info!("Control loop exited");
        });

        Ok((bound_port, handle))
    }

    /// One message per connection: read it, dispatch it, drop the socket.
    /// Decode failures drop the connection without touching the event
    /// stream.
    async fn handle_connection(
        mut stream: TcpStream,
        ip: String,
        events: mpsc::UnboundedSender<ControlEvent>,
    ) {
        let msg = match protocol::read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping control connection from {}: {}", ip, e);
                return;
            }
        };

        match msg {
            Message::FileList { hostname, files } => {
                debug!("FILE_LIST from {} ({}): {} files", hostname, ip, files.len());
                let _ = events.send(ControlEvent::FileList {
                    hostname,
                    ip,
                    files,
                });
            }
            Message::Chat {
                hostname,
                ip: sender_ip,
                text,
                timestamp,
            } => {
                debug!("CHAT from {} ({})", hostname, ip);
                let _ = events.send(ControlEvent::Chat(ChatMessage {
                    sender_hostname: hostname,
                    sender_ip,
                    text,
                    timestamp,
                }));
            }
            other => {
                debug!("Ignoring {:?} on control channel from {}", other, ip);
            }
        }
    }
}

/// Fire-and-forget control send: connect, write one frame, close. The
/// result is returned for logging, but callers are expected to ignore
/// failures; an unreachable peer simply misses the update.
pub async fn send_best_effort(ip: &str, port: u16, msg: &Message) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    let mut stream = timeout(SEND_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| ShareError::ConnectionFailed(format!("Connect timeout to {}", addr)))?
        .map_err(|e| ShareError::ConnectionFailed(format!("Connect to {}: {}", addr, e)))?;

    timeout(SEND_TIMEOUT, protocol::write_message(&mut stream, msg))
        .await
        .map_err(|_| ShareError::ConnectionFailed(format!("Send timeout to {}", addr)))?
}
