use std::borrow::Cow;
use std::sync::Arc;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::models::{ReceivedMessage, SendMessage, UserOfflineMessage};
use crate::services::auth_service::get_auth_token;
use crate::websocket::msg_collab_handler::relay_edit;
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_presence_handler::update_presence;
use crate::websocket::msg_room_handler::{handle_join, handle_leave};
use crate::websocket::msg_sync_handler::handle_sync_message;
use crate::ws::{ConnId, Connection, Identity, RoomKey, RoomRegistry};
use crate::AppState;

// Close frame reasons are capped at 123 bytes
const MAX_CLOSE_REASON: usize = 120;

// Frames read but not yet handled, per connection
const INBOX_CAPACITY: usize = 64;

// How long an evicted connection gets to take its close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    pub token: Option<String>,
}

/// WebSocket handler.
///
/// The credential is checked during the upgrade request, before the socket
/// exists; a failed check still upgrades so the browser can read the close
/// reason, then closes immediately.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HandshakeParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt");

    let token = match get_auth_token(&headers, params.token.as_deref()) {
        Ok(token) => Some(token),
        Err(e) => {
            debug!("No credential on handshake: {}", e);
            None
        }
    };
    let admission = state.verifier.verify(token.as_deref()).await;

    ws.on_upgrade(move |socket| async move {
        match admission {
            Ok(identity) => handle_socket(socket, identity, state).await,
            Err(e) => reject_socket(socket, e).await,
        }
    })
}

async fn reject_socket(mut socket: WebSocket, err: SyncError) {
    warn!("Rejecting WebSocket connection: {}", err);
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Cow::Owned(truncate_reason(err.to_string())),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame to rejected client: {}", e);
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

/// Cleans up a connection exactly once, however its task ends
struct DisconnectGuard {
    registry: Arc<RoomRegistry>,
    conn_id: ConnId,
    user_id: String,
    email: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let rooms = self.registry.drop_connection(self.conn_id);
        let offline = SendMessage::UserOffline(UserOfflineMessage {
            user_id: self.user_id.clone(),
        });
        let notified = self.registry.broadcast_all(&offline, Some(self.conn_id));
        info!(
            "User disconnected: {} (left {} rooms, {} peers notified)",
            self.email,
            rooms.len(),
            notified
        );
    }
}

/// Handle an authenticated WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: Arc<AppState>) {
    let (conn, mut queue) = state.registry.register(identity);
    let conn_id = conn.id();
    info!("User connected: {} on connection {}", conn.identity().email, conn_id);

    let _disconnect = DisconnectGuard {
        registry: state.registry.clone(),
        conn_id,
        user_id: conn.user_id().to_string(),
        email: conn.identity().email.clone(),
    };

    let (mut sender, mut receiver) = socket.split();
    let eviction = queue.eviction();
    let evicted = queue.eviction();

    // Drain this connection's outbound queue into the socket
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                _ = eviction.cancelled() => break,
                next = queue.recv() => match next {
                    Some(msg) => msg,
                    None => return,
                },
            };
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {} for connection {}: {}", msg.event(), conn_id, e);
                    continue;
                }
            };
            // A client that stopped reading parks us here; eviction still wins
            tokio::select! {
                biased;
                _ = eviction.cancelled() => break,
                sent = sender.send(Message::Text(text)) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }

        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: Cow::Borrowed("Connection closed by server"),
        };
        if timeout(CLOSE_GRACE, sender.send(Message::Close(Some(frame)))).await.is_err() {
            debug!("Close frame to connection {} timed out", conn_id);
        }
    });

    // Frames read off the socket wait here for the worker
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<String>(INBOX_CAPACITY);

    // Read frames until the transport closes
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if inbox_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket error on connection {}: {}", conn_id, e);
                    break;
                }
            }
        }
    });

    // Handle frames one at a time, in arrival order
    let mut work_task = tokio::spawn(async move {
        while let Some(text) = inbox_rx.recv().await {
            dispatch(&state, &conn, &text).await;
        }
    });

    // The first side to finish tears the connection down. Aborting the
    // worker cancels its in-flight store call.
    tokio::select! {
        _ = (&mut recv_task) => {
            work_task.abort();
            send_task.abort();
        }
        _ = (&mut work_task) => {
            recv_task.abort();
            send_task.abort();
        }
        _ = (&mut send_task) => {
            recv_task.abort();
            work_task.abort();
        }
        _ = evicted.cancelled() => {
            // The writer delivers the close frame on its own, bounded by CLOSE_GRACE
            recv_task.abort();
            work_task.abort();
        }
    };
    info!("WebSocket connection {} terminated", conn_id);
}

async fn dispatch(state: &AppState, conn: &Connection, text: &str) {
    let msg: ReceivedMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Ignoring malformed frame on connection {}: {}", conn.id(), e);
            return;
        }
    };

    match msg {
        ReceivedMessage::JoinWorkspace(id) => handle_join(&state.registry, conn, RoomKey::Workspace(id)),
        ReceivedMessage::LeaveWorkspace(id) => handle_leave(&state.registry, conn, RoomKey::Workspace(id)),
        ReceivedMessage::JoinPage(id) => handle_join(&state.registry, conn, RoomKey::Page(id)),
        ReceivedMessage::LeavePage(id) => handle_leave(&state.registry, conn, RoomKey::Page(id)),
        ReceivedMessage::SyncOperation(op) => handle_sync_message(&state.coordinator, conn, op).await,
        ReceivedMessage::CollabEdit(edit) => {
            relay_edit(&state.registry, conn, edit);
        }
        ReceivedMessage::PresenceUpdate(update) => {
            update_presence(&state.registry, conn, update);
        }
        ReceivedMessage::Ping => handle_ping_message(conn),
    }
}
