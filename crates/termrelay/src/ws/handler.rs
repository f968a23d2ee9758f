//! WebSocket handler for terminal connections.
//!
//! Each connection runs exactly one session. Client frames become the
//! session's inbound byte stream; session messages are serialized as JSON
//! text frames by a dedicated writer task.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt, future};
use log::{debug, info, warn};
use termrelay_protocol::RelayMessage;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::session::SessionController;

/// WebSocket upgrade handler.
///
/// GET /ws/terminal
pub async fn terminal_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state))
}

async fn handle_terminal_socket(socket: WebSocket, state: AppState) {
    let (mut sender, receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<RelayMessage>(state.outbound_buffer());

    let controller = SessionController::new(state.sessions.clone());
    let session_id = controller.id();
    info!("terminal connection opened (session {})", session_id);

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize relay message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("client socket closed, dropping remaining output");
                return;
            }
        }
        if let Err(e) = sender.send(Message::Close(None)).await {
            debug!("close frame not delivered: {}", e);
        }
    });

    let outcome = controller.run(inbound_bytes(receiver), tx).await;

    if let Err(e) = send_task.await {
        warn!("terminal writer task failed: {}", e);
    }
    info!(
        "terminal connection closed (session {}, exit_code={:?}, disconnected={})",
        session_id, outcome.exit_code, outcome.client_disconnected
    );
}

/// What one client frame means for the session.
enum Frame {
    Data(Bytes),
    Skip,
    End,
}

impl Frame {
    fn classify(message: Result<Message, axum::Error>) -> Self {
        match message {
            Ok(Message::Text(text)) => Frame::Data(Bytes::copy_from_slice(text.as_str().as_bytes())),
            Ok(Message::Binary(data)) => Frame::Data(data),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Frame::Skip,
            Ok(Message::Close(_)) => Frame::End,
            Err(e) => {
                debug!("terminal socket error, treating as disconnect: {}", e);
                Frame::End
            }
        }
    }
}

/// Adapt a socket's incoming frames into session input. The stream ends at
/// the first close frame or transport error.
fn inbound_bytes<S>(receiver: S) -> impl Stream<Item = Bytes> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    receiver
        .map(Frame::classify)
        .take_while(|frame| future::ready(!matches!(frame, Frame::End)))
        .filter_map(|frame| {
            future::ready(match frame {
                Frame::Data(bytes) => Some(bytes),
                Frame::Skip | Frame::End => None,
            })
        })
}
