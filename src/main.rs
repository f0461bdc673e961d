use clap::{Parser, Subcommand};
use lanshare::{setup_logging, Config, Node, NodeEvent, Result};
use log::info;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "lanshare")]
#[command(about = "Serverless LAN file sharing with peer discovery and chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node: discover peers, serve shared files, relay chat.
    /// Lines typed on stdin are sent as chat; Ctrl+C stops gracefully.
    Start {
        /// Display name announced to peers (defaults to the machine hostname)
        #[arg(short, long)]
        name: Option<String>,
        /// Files to share, repeatable
        #[arg(short, long)]
        share: Vec<PathBuf>,
        /// Directory downloads are saved into
        #[arg(short, long, default_value = "./downloads")]
        download_dir: PathBuf,
        /// UDP discovery port
        #[arg(long, default_value_t = lanshare::core::config::DEFAULT_DISCOVERY_PORT)]
        discovery_port: u16,
        /// TCP control port
        #[arg(long, default_value_t = lanshare::core::config::DEFAULT_CONTROL_PORT)]
        control_port: u16,
        /// TCP transfer port
        #[arg(long, default_value_t = lanshare::core::config::DEFAULT_TRANSFER_PORT)]
        transfer_port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            name,
            share,
            download_dir,
            discovery_port,
            control_port,
            transfer_port,
        } => {
            let config = Config {
                hostname: name.unwrap_or_else(lanshare::core::config::default_hostname),
                discovery_port,
                control_port,
                transfer_port,
                download_dir,
                ..Config::default()
            };

            let (event_tx, mut events) = lanshare::event_channel();
            let mut node = Node::new(config, event_tx);
            node.start().await?;

            for path in &share {
                let file = node.share_file(path).await?;
                info!("Sharing {} as {}", file.filename, file.file_id);
            }

            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    print_event(&event);
                }
            });

            let mut stdin = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl+C received, shutting down");
                        break;
                    }
                    line = stdin.next_line() => {
                        match line {
                            Ok(Some(text)) if !text.trim().is_empty() => {
                                node.send_chat(text.trim()).await;
                            }
                            Ok(Some(_)) => {}
                            Ok(None) | Err(_) => break,
                        }
                    }
                }
            }

            node.stop().await;
        }
    }

    Ok(())
}

fn print_event(event: &NodeEvent) {
    match event {
        NodeEvent::PeerAppeared {
            hostname,
            ip,
            control_port,
        } => info!("Peer appeared: {} ({}:{})", hostname, ip, control_port),
        NodeEvent::PeerGone { ip } => info!("Peer gone: {}", ip),
        NodeEvent::FileListReceived {
            hostname, files, ..
        } => {
            info!("{} shares {} file(s)", hostname, files.len());
            for file in files {
                info!("  {} {} ({} bytes)", file.file_id, file.filename, file.size);
            }
        }
        NodeEvent::ChatReceived(chat) => {
            info!("<{}> {}", chat.sender_hostname, chat.text);
        }
        NodeEvent::TransferStarted {
            file_id,
            requester_ip,
        } => info!("Serving {} to {}", file_id, requester_ip),
        NodeEvent::DownloadProgress {
            file_id,
            downloaded,
            total,
        } => info!("Download {}: {}/{} bytes", file_id, downloaded, total),
        NodeEvent::DownloadCompleted {
            file_id,
            saved_path,
        } => info!("Download {} completed: {}", file_id, saved_path.display()),
        NodeEvent::DownloadFailed { file_id, reason } => {
            info!("Download {} failed: {}", file_id, reason)
        }
        NodeEvent::DownloadCancelled { file_id } => info!("Download {} cancelled", file_id),
    }
}
