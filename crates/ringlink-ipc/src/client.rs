//! Display link client

use ringlink_api::{ClientFrame, DisplayMessage, ServerFrame, API_VERSION};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{IpcError, IpcResult};

/// Client side of the display link, used by displays and tools
pub struct DisplayClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl DisplayClient {
    /// Connect to ringlinkd
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Wait for the next frame from the server
    pub async fn next_frame(&mut self) -> IpcResult<ServerFrame> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let frame: ServerFrame = serde_json::from_str(line.trim())?;
        Ok(frame)
    }

    /// Read the greeting and check the protocol version
    pub async fn expect_hello(&mut self) -> IpcResult<()> {
        match self.next_frame().await? {
            ServerFrame::Hello { api_version } if api_version == API_VERSION => Ok(()),
            ServerFrame::Hello { api_version } => Err(IpcError::InvalidMessage(format!(
                "unsupported api version {}",
                api_version
            ))),
            other => Err(IpcError::InvalidMessage(format!(
                "expected hello, got {:?}",
                other
            ))),
        }
    }

    /// Wait for the next display message, skipping anything else
    pub async fn next_display(&mut self) -> IpcResult<(u64, DisplayMessage)> {
        loop {
            if let ServerFrame::Display { seq, message } = self.next_frame().await? {
                return Ok((seq, message));
            }
        }
    }

    pub async fn ack(&mut self, seq: u64) -> IpcResult<()> {
        self.send(&ClientFrame::Ack { seq }).await
    }

    pub async fn nack(&mut self, seq: u64, reason: impl Into<String>) -> IpcResult<()> {
        self.send(&ClientFrame::Nack {
            seq,
            reason: Some(reason.into()),
        })
        .await
    }

    /// Ask for an immediate fetch cycle
    pub async fn request_data(&mut self) -> IpcResult<()> {
        self.send(&ClientFrame::RequestData).await
    }

    /// Forward the configuration page result; `None` means "no change"
    pub async fn configuration_closed(&mut self, response: Option<String>) -> IpcResult<()> {
        self.send(&ClientFrame::ConfigurationClosed { response }).await
    }

    async fn send(&mut self, frame: &ClientFrame) -> IpcResult<()> {
        let mut json = serde_json::to_string(frame)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        Ok(())
    }
}
