//! WebSocket sync sessions.
//!
//! Each connection gets the full snapshot first (deduplicated across
//! concurrent connects by the engine's single-flight), then receives
//! change broadcasts. Inbound client writes and deletes are applied to
//! the filesystem and re-validated through the standard debounced
//! rebuild; the registry is never updated here, so there is only one
//! source of truth. No failure in a session crashes it or any other
//! session.

use crate::engine::SyncEngine;
use crate::wire::protocol::ProtocolError;
use crate::wire::{ClientEvent, ClientMessage, ServerMessage};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Errors from handling one inbound client frame. Logged, never fatal
/// to the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("filesystem operation failed for {path}: {source}")]
    Fs {
        path: String,
        source: std::io::Error,
    },
}

/// Router exposing the sync channel at `GET /sync`.
pub fn router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/sync", get(ws_handler))
        .with_state(engine)
}

async fn ws_handler(
    State(engine): State<Arc<SyncEngine>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(engine, socket))
}

async fn handle_session(engine: Arc<SyncEngine>, socket: WebSocket) {
    let session_id = uuid::Uuid::new_v4();
    tracing::info!("sync session {} connected", session_id);

    // Subscribe before snapshotting so no change falls in the gap
    // between the snapshot and the first broadcast.
    let mut changes = engine.subscribe();
    let files = engine.clone().initial_snapshot().await;
    let initial = ServerMessage::InitialSync {
        files: (*files).clone(),
        directory: engine.project_root().display().to_string(),
    };

    let (mut sink, mut stream) = socket.split();
    if send_message(&mut sink, &initial).await.is_err() {
        tracing::info!("sync session {} closed before initial sync", session_id);
        return;
    }
    tracing::info!(
        "sent initial snapshot of {} files to session {}",
        files.len(),
        session_id
    );

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(message) => {
                    if send_message(&mut sink, &message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // A client that cannot keep up would see an
                    // incoherent stream; drop it and let it reconnect
                    // for a fresh snapshot.
                    tracing::warn!(
                        "sync session {} lagged {} messages, closing",
                        session_id,
                        skipped
                    );
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_client_frame(&engine, &text).await {
                        tracing::warn!("sync session {}: ignoring request: {}", session_id, e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                Some(Err(e)) => {
                    tracing::debug!("sync session {} socket error: {}", session_id, e);
                    break;
                }
            },
        }
    }
    tracing::info!("sync session {} disconnected", session_id);
}

async fn send_message(
    sink: &mut (impl futures::Sink<Message, Error = axum::Error> + Unpin),
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}

/// Apply one inbound write/delete request, then schedule the rebuild
/// that re-validates it against the authoritative diff path.
async fn handle_client_frame(engine: &Arc<SyncEngine>, text: &str) -> Result<(), SessionError> {
    let ClientMessage::ClientFileChange {
        event,
        path,
        content,
    } = ClientMessage::parse(text)?;
    let Some(abs) = engine.codec().from_wire(&path) else {
        return Err(ProtocolError::PathOutsideRoot(path).into());
    };

    match event {
        ClientEvent::Write => {
            let encoded = content.ok_or_else(|| ProtocolError::MissingContent(path.clone()))?;
            let bytes = crate::b64::decode(&encoded).map_err(ProtocolError::from)?;
            if let Some(parent) = abs.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    SessionError::Fs {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
            tokio::fs::write(&abs, bytes)
                .await
                .map_err(|source| SessionError::Fs {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!("client wrote {} ({})", path, abs.display());
        }
        ClientEvent::Delete => match tokio::fs::remove_file(&abs).await {
            Ok(()) => tracing::info!("client deleted {} ({})", path, abs.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("client delete for unknown path {}", path);
                return Ok(());
            }
            Err(source) => return Err(SessionError::Fs { path, source }),
        },
    }

    engine.schedule_rebuild(true);
    Ok(())
}
