//! Transport seam for the telemetry wire.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::ChannelError;

/// One duplex frame pipe. Implementations deliver whole frames in arrival
/// order, never reordered or deduplicated. `None` from [`next_frame`] means
/// the peer closed cleanly.
///
/// [`next_frame`]: FrameTransport::next_frame
#[async_trait]
pub trait FrameTransport: Send {
    async fn send(&mut self, frame: &str) -> Result<(), ChannelError>;
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError>;
}

/// Newline-delimited JSON over TCP, the framing the simulation bridge emits.
pub struct TcpTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ChannelError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read),
            writer: write,
            line: String::new(),
        })
    }
}

#[async_trait]
impl FrameTransport for TcpTransport {
    async fn send(&mut self, frame: &str) -> Result<(), ChannelError> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        self.line.clear();
        let read = self.reader.read_line(&mut self.line).await?;
        if read == 0 {
            Ok(None)
        } else {
            Ok(Some(self.line.trim_end().to_string()))
        }
    }
}
