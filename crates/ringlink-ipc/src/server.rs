//! Display link server

use async_trait::async_trait;
use ringlink_adapter_api::{DisplayTransport, TransportError, TransportResult};
use ringlink_api::{ClientFrame, DisplayMessage, ServerFrame};
use ringlink_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Longest inbound frame accepted from a display, newline included
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Inbound events for the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    DisplayConnected {
        client_id: ClientId,
    },
    DisplayDisconnected {
        client_id: ClientId,
    },
    /// Manual refresh
    RequestData {
        client_id: ClientId,
    },
    /// Configuration page closed; `None` means no change
    ConfigurationClosed {
        client_id: ClientId,
        response: Option<String>,
    },
}

#[derive(Debug)]
enum AckOutcome {
    Ack,
    Nack(String),
}

struct ActiveClient {
    client_id: ClientId,
    frame_tx: mpsc::UnboundedSender<String>,
}

type PendingAcks = HashMap<u64, oneshot::Sender<AckOutcome>>;

/// Shared between the server handle and the per-connection tasks
struct Shared {
    active: Mutex<Option<ActiveClient>>,
    pending: Mutex<PendingAcks>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveClient>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, PendingAcks> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self, client_id: &ClientId) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|c| &c.client_id == client_id)
    }

    fn resolve(&self, seq: u64, outcome: AckOutcome) {
        match self.pending().remove(&seq) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!(seq, "Acknowledgement for unknown or expired message"),
        }
    }
}

/// Display link server.
///
/// Exactly one display is served at a time; a new connection replaces the
/// previous one. Every message sent through [`DisplayTransport::send`] waits
/// for the display's `ack`/`nack` of its sequence number.
pub struct DisplayServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
    ack_timeout: Duration,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
}

impl DisplayServer {
    /// Create a new display link server
    pub fn new(socket_path: impl AsRef<Path>, ack_timeout: Duration) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
            }),
            next_seq: AtomicU64::new(1),
            ack_timeout,
            message_tx,
            message_rx: Mutex::new(Some(message_rx)),
        }
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Readable/writable by owner and group
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "Display link listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for inbound events (can be taken once)
    pub fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = stream.peer_cred().ok().map(|c| c.uid());
                    info!(client_id = %client_id, uid = ?uid, "Display connected");

                    self.handle_client(stream, client_id);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_client(&self, stream: UnixStream, client_id: ClientId) {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

        // Register as the active display, dropping the previous one
        let previous = self.shared.active().replace(ActiveClient {
            client_id: client_id.clone(),
            frame_tx: frame_tx.clone(),
        });
        if let Some(previous) = previous {
            info!(
                old = %previous.client_id,
                new = %client_id,
                "Replacing active display"
            );
            // Outstanding sends to the old display resolve as Closed
            self.shared.pending().clear();
            let _ = self.message_tx.send(ServerMessage::DisplayDisconnected {
                client_id: previous.client_id,
            });
        }

        if let Ok(hello) = serde_json::to_string(&ServerFrame::hello()) {
            let _ = frame_tx.send(hello);
        }

        let _ = self.message_tx.send(ServerMessage::DisplayConnected {
            client_id: client_id.clone(),
        });

        // Reader task
        let shared = self.shared.clone();
        let message_tx = self.message_tx.clone();
        let reader_id = client_id.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                let read = (&mut reader)
                    .take(MAX_FRAME_BYTES as u64)
                    .read_line(&mut line)
                    .await;
                match read {
                    Ok(0) => {
                        debug!(client_id = %reader_id, "Display disconnected (EOF)");
                        break;
                    }
                    Ok(n) if n >= MAX_FRAME_BYTES && !line.ends_with('\n') => {
                        warn!(
                            client_id = %reader_id,
                            limit = MAX_FRAME_BYTES,
                            "Frame too long, dropping display"
                        );
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if !shared.is_active(&reader_id) {
                            debug!(client_id = %reader_id, "Ignoring frame from replaced display");
                            continue;
                        }

                        match serde_json::from_str::<ClientFrame>(line) {
                            Ok(ClientFrame::Ack { seq }) => shared.resolve(seq, AckOutcome::Ack),
                            Ok(ClientFrame::Nack { seq, reason }) => shared.resolve(
                                seq,
                                AckOutcome::Nack(reason.unwrap_or_else(|| "nack".into())),
                            ),
                            Ok(ClientFrame::RequestData) => {
                                let _ = message_tx.send(ServerMessage::RequestData {
                                    client_id: reader_id.clone(),
                                });
                            }
                            Ok(ClientFrame::ConfigurationClosed { response }) => {
                                let _ = message_tx.send(ServerMessage::ConfigurationClosed {
                                    client_id: reader_id.clone(),
                                    response,
                                });
                            }
                            Err(e) => {
                                warn!(client_id = %reader_id, error = %e, "Invalid frame");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %reader_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            // Only the active display's departure clears the slot
            let was_active = {
                let mut active = shared.active();
                if active.as_ref().is_some_and(|c| c.client_id == reader_id) {
                    *active = None;
                    true
                } else {
                    false
                }
            };
            if was_active {
                shared.pending().clear();
                let _ = message_tx.send(ServerMessage::DisplayDisconnected {
                    client_id: reader_id,
                });
            }
        });

        // Writer task; ends when the display is replaced or disconnects
        let writer_id = client_id;
        tokio::spawn(async move {
            let mut writer = write_half;

            while let Some(mut frame) = frame_rx.recv().await {
                frame.push('\n');
                if let Err(e) = writer.write_all(frame.as_bytes()).await {
                    debug!(client_id = %writer_id, error = %e, "Write error");
                    break;
                }
            }

            let _ = writer.shutdown().await;
        });
    }

    /// Connected display, if any
    pub fn active_client(&self) -> Option<ClientId> {
        self.shared.active().as_ref().map(|c| c.client_id.clone())
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shared.active().take();
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for DisplayServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl DisplayTransport for DisplayServer {
    async fn send(&self, message: &DisplayMessage) -> TransportResult<()> {
        let frame_tx = self
            .shared
            .active()
            .as_ref()
            .map(|c| c.frame_tx.clone())
            .ok_or(TransportError::NotConnected)?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&ServerFrame::display(seq, message.clone()))
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.pending().insert(seq, ack_tx);

        if frame_tx.send(json).is_err() {
            self.shared.pending().remove(&seq);
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(AckOutcome::Ack)) => {
                debug!(seq, "Display acknowledged");
                Ok(())
            }
            Ok(Ok(AckOutcome::Nack(reason))) => Err(TransportError::Rejected(reason)),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.shared.pending().remove(&seq);
                Err(TransportError::AckTimeout)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.active().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DisplayClient;
    use ringlink_api::keys;
    use tempfile::tempdir;

    async fn started(dir: &tempfile::TempDir, ack_timeout: Duration) -> Arc<DisplayServer> {
        let mut server = DisplayServer::new(dir.path().join("display.sock"), ack_timeout);
        server.start().await.unwrap();
        let server = Arc::new(server);
        let runner = server.clone();
        tokio::spawn(async move { runner.run().await });
        server
    }

    async fn connect(dir: &tempfile::TempDir) -> DisplayClient {
        let mut client = DisplayClient::connect(dir.path().join("display.sock"))
            .await
            .unwrap();
        client.expect_hello().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("display.sock");

        let mut server = DisplayServer::new(&socket_path, Duration::from_secs(1));
        server.start().await.unwrap();

        assert!(socket_path.exists());
        assert!(!server.is_connected());
    }

    #[tokio::test]
    async fn send_without_display_fails_fast() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(1)).await;

        let result = server.send(&DisplayMessage::debug_status("hi")).await;
        assert_eq!(result, Err(TransportError::NotConnected));
    }

    #[tokio::test]
    async fn acked_send_succeeds() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(5)).await;
        let mut client = connect(&dir).await;
        assert!(server.is_connected());

        let sender = server.clone();
        let send = tokio::spawn(async move {
            let mut msg = DisplayMessage::new();
            msg.set_int(keys::SLEEP_SCORE, 72);
            sender.send(&msg).await
        });

        let (seq, message) = client.next_display().await.unwrap();
        assert_eq!(message.get_int(keys::SLEEP_SCORE), Some(72));
        client.ack(seq).await.unwrap();

        assert_eq!(send.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn nack_is_rejection() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(5)).await;
        let mut client = connect(&dir).await;

        let sender = server.clone();
        let send =
            tokio::spawn(async move { sender.send(&DisplayMessage::debug_status("x")).await });

        let (seq, _) = client.next_display().await.unwrap();
        client.nack(seq, "busy").await.unwrap();

        assert_eq!(
            send.await.unwrap(),
            Err(TransportError::Rejected("busy".into()))
        );
    }

    #[tokio::test]
    async fn missing_ack_times_out() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_millis(100)).await;
        let mut client = connect(&dir).await;

        let result = server.send(&DisplayMessage::debug_status("x")).await;
        assert_eq!(result, Err(TransportError::AckTimeout));

        // The frame did reach the display
        let (_, message) = client.next_display().await.unwrap();
        assert_eq!(message.get_text(keys::DEBUG_STATUS), Some("x"));
    }

    #[tokio::test]
    async fn inbound_requests_are_forwarded() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(1)).await;
        let mut rx = server.take_message_receiver().unwrap();
        let mut client = connect(&dir).await;

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::DisplayConnected { .. })
        ));

        client.request_data().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::RequestData { .. })
        ));

        client.configuration_closed(None).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::ConfigurationClosed { response: None, .. })
        ));
    }

    #[tokio::test]
    async fn new_display_replaces_old() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(1)).await;
        let mut rx = server.take_message_receiver().unwrap();

        let mut first = connect(&dir).await;
        let first_id = match rx.recv().await {
            Some(ServerMessage::DisplayConnected { client_id }) => client_id,
            other => panic!("unexpected {:?}", other),
        };

        let _second = connect(&dir).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::DisplayDisconnected {
                client_id: first_id.clone()
            })
        );
        let second_id = match rx.recv().await {
            Some(ServerMessage::DisplayConnected { client_id }) => client_id,
            other => panic!("unexpected {:?}", other),
        };
        assert_ne!(first_id, second_id);
        assert_eq!(server.active_client(), Some(second_id));

        // The old connection is closed from the server side
        assert!(matches!(
            first.next_frame().await,
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn oversized_frame_drops_display() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(1)).await;
        let mut rx = server.take_message_receiver().unwrap();

        let stream = UnixStream::connect(dir.path().join("display.sock"))
            .await
            .unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut hello = String::new();
        BufReader::new(read_half).read_line(&mut hello).await.unwrap();
        assert!(hello.contains("hello"));
        rx.recv().await.unwrap();

        let junk = vec![b'x'; MAX_FRAME_BYTES + 1024];
        let _ = write_half.write_all(&junk).await;

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::DisplayDisconnected { .. })
        ));
        assert!(!server.is_connected());
    }

    #[tokio::test]
    async fn disconnect_clears_active_display() {
        let dir = tempdir().unwrap();
        let server = started(&dir, Duration::from_secs(1)).await;
        let mut rx = server.take_message_receiver().unwrap();

        let client = connect(&dir).await;
        rx.recv().await.unwrap();
        drop(client);

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::DisplayDisconnected { .. })
        ));
        assert!(!server.is_connected());
    }
}
