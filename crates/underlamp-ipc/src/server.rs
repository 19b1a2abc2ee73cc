//! IPC server implementation

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};
use underlamp_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response,
};
use underlamp_util::ClientId;

use crate::{IpcError, IpcResult};

/// Message from a connection task to the service
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

type Clients = Arc<RwLock<HashMap<ClientId, ClientHandle>>>;

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Role for a peer: root and the service's own UID are admins
pub fn role_for_uid(peer_uid: Option<u32>, service_uid: u32) -> ClientRole {
    match peer_uid {
        Some(0) => ClientRole::Admin,
        Some(uid) if uid == service_uid => ClientRole::Admin,
        _ => ClientRole::Operator,
    }
}

/// Unix socket server speaking NDJSON
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Clients,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Mutex::new(Some(message_rx)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group may connect; operators are added to the group
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);
        Ok(())
    }

    /// Take the receiver for connection messages (once)
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections until the listener fails
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;
        let service_uid = nix::unistd::getuid().as_raw();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let uid = peer_uid(&stream);
                    let role = role_for_uid(uid, service_uid);

                    let mut info = ClientInfo::new(role);
                    if let Some(uid) = uid {
                        info = info.with_uid(uid);
                    }
                    let client_id = info.client_id.clone();

                    debug!(client_id = %client_id, uid = ?uid, role = ?role, "Client accepted");
                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                info: info.clone(),
                response_tx: response_tx.clone(),
                subscribed: false,
            },
        );

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        tokio::spawn(read_requests(
            read_half,
            client_id.clone(),
            self.clients.clone(),
            self.message_tx.clone(),
            response_tx,
        ));

        tokio::spawn(write_messages(
            write_half,
            client_id,
            self.clients.clone(),
            response_rx,
            self.event_tx.subscribe(),
        ));
    }

    /// Send a response to one client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some(handle) => handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed),
            None => Err(IpcError::ConnectionClosed),
        }
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// In-process view of the broadcast events
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        self.clients
            .read()
            .await
            .get(client_id)
            .map(|h| h.info.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_requests(
    read_half: OwnedReadHalf,
    client_id: ClientId,
    clients: Clients,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    response_tx: mpsc::UnboundedSender<String>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(client_id = %client_id, "Client disconnected (EOF)");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<Request>(line) {
                    Ok(request) => {
                        let subscribe = match request.command {
                            Command::SubscribeEvents => Some(true),
                            Command::UnsubscribeEvents => Some(false),
                            _ => None,
                        };
                        if let Some(subscribed) = subscribe
                            && let Some(handle) = clients.write().await.get_mut(&client_id)
                        {
                            handle.subscribed = subscribed;
                        }

                        let _ = message_tx.send(ServerMessage::Request {
                            client_id: client_id.clone(),
                            request,
                        });
                    }
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Invalid request");
                        let response = Response::error(
                            0,
                            ErrorInfo::new(
                                ErrorCode::InvalidRequest,
                                format!("Malformed request: {}", e),
                            ),
                        );
                        if let Ok(json) = serde_json::to_string(&response) {
                            let _ = response_tx.send(json);
                        }
                    }
                }
            }
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Read error");
                break;
            }
        }
    }

    // Dropping the handle closes the writer's response channel
    clients.write().await.remove(&client_id);
    let _ = message_tx.send(ServerMessage::ClientDisconnected { client_id });
}

async fn write_messages(
    mut writer: OwnedWriteHalf,
    client_id: ClientId,
    clients: Clients,
    mut response_rx: mpsc::UnboundedReceiver<String>,
    mut event_rx: broadcast::Receiver<Event>,
) {
    loop {
        let line = tokio::select! {
            response = response_rx.recv() => match response {
                Some(json) => json,
                None => break,
            },

            event = event_rx.recv() => match event {
                Ok(event) => {
                    let subscribed = clients
                        .read()
                        .await
                        .get(&client_id)
                        .is_some_and(|h| h.subscribed);
                    if !subscribed {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize event");
                            continue;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(client_id = %client_id, missed, "Subscriber lagging, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let mut msg = line;
        msg.push('\n');
        if let Err(e) = writer.write_all(msg.as_bytes()).await {
            debug!(client_id = %client_id, error = %e, "Write error");
            break;
        }
    }
}

fn peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();
    nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials)
        .ok()
        .map(|cred| cred.uid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roles_from_uid() {
        assert_eq!(role_for_uid(Some(0), 1000), ClientRole::Admin);
        assert_eq!(role_for_uid(Some(1000), 1000), ClientRole::Admin);
        assert_eq!(role_for_uid(Some(1001), 1000), ClientRole::Operator);
        assert_eq!(role_for_uid(None, 1000), ClientRole::Operator);
    }

    #[tokio::test]
    async fn start_creates_socket_with_group_access() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("run").join("underlampd.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        drop(server);
        assert!(!socket_path.exists());
    }
}
