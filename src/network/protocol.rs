//! Control-message codec: a closed set of JSON messages, each framed with a
//! 4-byte big-endian length prefix. The binary file-transfer path does not
//! use this codec (see `transfer`).

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::models::FileEntry;
use crate::utils::{Result, ShareError};

pub const HEADER_SIZE: usize = 4;
/// Sanity ceiling on a declared frame length; bounds memory exposure from a
/// hostile or buggy peer.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;
/// Chunk size for file transfer streaming.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Hello {
        hostname: String,
        control_port: u16,
    },
    Bye {
        hostname: String,
    },
    FileList {
        hostname: String,
        files: Vec<FileEntry>,
    },
    Chat {
        hostname: String,
        ip: String,
        text: String,
        timestamp: f64,
    },
    /// Declared for wire completeness; actual file requests travel over the
    /// binary transfer protocol.
    FileReq {
        file_id: String,
        offset: u64,
    },
}

/// Serialize a message with its length prefix.
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a message body (without the length prefix). Any invalid input
/// yields `MalformedMessage`; callers drop the message and carry on.
pub fn decode(data: &[u8]) -> Result<Message> {
    serde_json::from_slice(data).map_err(|e| ShareError::MalformedMessage(e.to_string()))
}

/// Read one framed message from a stream.
pub async fn read_message<R>(stream: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    read_exact_counted(stream, &mut header).await?;
    let length = u32::from_be_bytes(header) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ShareError::FrameTooLarge(length));
    }

    let mut body = vec![0u8; length];
    read_exact_counted(stream, &mut body).await?;
    decode(&body)
}

/// Write one framed message to a stream.
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Fill `buf` completely, reporting how far we got if the stream closes
/// early.
async fn read_exact_counted<R>(stream: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let expected = buf.len();
    let mut filled = 0;
    while filled < expected {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ShareError::IncompleteFrame {
                expected,
                got: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

impl Message {
    pub fn hello(hostname: &str, control_port: u16) -> Self {
        Message::Hello {
            hostname: hostname.to_string(),
            control_port,
        }
    }

    pub fn bye(hostname: &str) -> Self {
        Message::Bye {
            hostname: hostname.to_string(),
        }
    }

    pub fn file_list(hostname: &str, files: Vec<FileEntry>) -> Self {
        Message::FileList {
            hostname: hostname.to_string(),
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> FileEntry {
        FileEntry {
            file_id: "deadbeef0123".to_string(),
            filename: "notes.txt".to_string(),
            size: 2048,
            owner_ip: "192.168.1.5".to_string(),
            owner_hostname: "alice".to_string(),
        }
    }

    fn all_variants() -> Vec<Message> {
        vec![
            Message::hello("alice", 37711),
            Message::bye("alice"),
            Message::file_list("alice", vec![sample_entry()]),
            Message::Chat {
                hostname: "alice".to_string(),
                ip: "192.168.1.5".to_string(),
                text: "hi there".to_string(),
                timestamp: 1724700000.25,
            },
            Message::FileReq {
                file_id: "deadbeef0123".to_string(),
                offset: 65536,
            },
        ]
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for msg in all_variants() {
            let frame = encode(&msg).unwrap();
            let decoded = decode(&frame[HEADER_SIZE..]).unwrap();
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn test_wire_type_tags() {
        let frame = encode(&Message::hello("alice", 37711)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(json["type"], "HELLO");

        let frame = encode(&Message::file_list("alice", vec![])).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(json["type"], "FILE_LIST");
    }

    #[test]
    fn test_decode_garbage_is_malformed_not_panic() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(ShareError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode(br#"{"type": "NO_SUCH_TYPE"}"#),
            Err(ShareError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode(br#"{"type": "HELLO"}"#),
            Err(ShareError::MalformedMessage(_))
        ));
        assert!(matches!(decode(&[]), Err(ShareError::MalformedMessage(_))));
    }

    #[tokio::test]
    async fn test_framed_round_trip_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let msg = Message::file_list("alice", vec![sample_entry()]);
        write_message(&mut client, &msg).await.unwrap();
        let received = read_message(&mut server).await.unwrap();
        assert_eq!(msg, received);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let declared = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        tokio::spawn(async move {
            let _ = client.write_all(&declared).await;
        });
        assert!(matches!(
            read_message(&mut server).await,
            Err(ShareError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_incomplete() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        // Declare 100 bytes, deliver 10, close.
        tokio::spawn(async move {
            let _ = client.write_all(&100u32.to_be_bytes()).await;
            let _ = client.write_all(&[0u8; 10]).await;
        });
        match read_message(&mut server).await {
            Err(ShareError::IncompleteFrame { expected, got }) => {
                assert_eq!(expected, 100);
                assert_eq!(got, 10);
            }
            other => panic!("expected IncompleteFrame, got {:?}", other),
        }
    }
}
