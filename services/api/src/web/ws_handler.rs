//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! It attaches the connection to the session, dispatches inbound events, and
//! schedules the session's deferred teardown on disconnect.

use crate::{
    adapters::{BridgeMessagingClient, RestDirectoryAdapter},
    web::{
        channel::{Connection, OutboundFrame},
        protocol::{ClientEvent, ServerEvent},
        registry::{Resource, ResourceKey, CLEANUP_GRACE, SESSION_TTL},
        state::AppState,
        sync_task::sync_process,
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use photosync_core::domain::LifecycleEvent;
use photosync_core::MessagingService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(session_id): Extension<Uuid>, // from the session middleware
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session_id: Uuid) {
    info!(%session_id, "new WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (connection, mut frames) = Connection::new();

    // The writer task owns the sink and drains the outbound queue.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match frame {
                OutboundFrame::Event(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // --- 1. Attach ---
    // Reconnection supersedes any pending teardown; storing the new
    // connection closes a stale one.
    app_state.registry.cancel_cleanup(session_id);
    app_state.registry.put(
        session_id,
        ResourceKey::Connection,
        Resource::Connection(connection.clone()),
        SESSION_TTL,
    );

    // --- 2. Main Message Loop ---
    let mut sync_job_handle: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                dispatch_text(
                    text.to_string(),
                    &app_state,
                    session_id,
                    &connection,
                    &mut sync_job_handle,
                )
                .await;
            }
            Message::Close(_) => {
                info!(%session_id, "client sent close message");
                break;
            }
            _ => {}
        }
    }

    // --- 3. Detach ---
    connection.close();
    writer.abort();

    // Only the newest connection schedules teardown; a stale socket closing
    // after a reconnect must not tear down the fresh one.
    let still_attached = app_state
        .registry
        .connection(session_id)
        .is_some_and(|current| current.id() == connection.id());
    if still_attached {
        app_state
            .registry
            .delete(session_id, ResourceKey::Connection);
        app_state
            .registry
            .clone()
            .schedule_cleanup(session_id, CLEANUP_GRACE);
    }
    info!(%session_id, "WebSocket connection closed");
}

/// Helper function to handle the logic for different `ClientEvent` variants.
async fn dispatch_text(
    text: String,
    app_state: &Arc<AppState>,
    session_id: Uuid,
    connection: &Arc<Connection>,
    sync_job_handle: &mut Option<JoinHandle<()>>,
) {
    match serde_json::from_str::<ClientEvent>(&text) {
        Ok(event) => {
            // A pending request/response wait consumes its expected type first.
            let Some(event) = connection.resolve(event) else {
                return;
            };
            match event {
                ClientEvent::WhatsappConnect => {
                    handle_whatsapp_connect(app_state, session_id, connection).await;
                }
                ClientEvent::StartSync(options) => {
                    handle_start_sync(app_state, session_id, connection, options, sync_job_handle)
                        .await;
                }
                ClientEvent::SyncPhotoConfirm(_) => {
                    warn!(%session_id, "sync_photo_confirm with no pending confirmation, dropping");
                }
            }
        }
        Err(e) => {
            warn!(%session_id, error = %e, "failed to deserialize client message, dropping");
        }
    }
}

/// Initializes the session's messaging client, destroying any prior one, and
/// pumps its lifecycle events to the client until it is ready or failed.
async fn handle_whatsapp_connect(
    app_state: &Arc<AppState>,
    session_id: Uuid,
    connection: &Arc<Connection>,
) {
    let client = match BridgeMessagingClient::connect(
        app_state.http.clone(),
        app_state.config.bridge_url.clone(),
        session_id,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!(%session_id, error = %e, "failed to create messaging client");
            let _ = connection.publish(&ServerEvent::Redirect("/".to_string()));
            return;
        }
    };

    // put() releases any previous client for this session first.
    app_state.registry.put(
        session_id,
        ResourceKey::MessagingClient,
        Resource::MessagingClient(client.clone()),
        SESSION_TTL,
    );

    let connection = connection.clone();
    tokio::spawn(async move {
        loop {
            match client.next_lifecycle_event().await {
                Ok(LifecycleEvent::QrReady(qr)) => {
                    if connection.publish(&ServerEvent::WhatsappQr(qr)).is_err() {
                        break;
                    }
                }
                Ok(LifecycleEvent::Connecting) => {
                    let _ = connection.publish(&ServerEvent::WhatsappConnecting(()));
                }
                Ok(LifecycleEvent::Ready) => {
                    info!(%session_id, "messaging client ready");
                    let _ = connection.publish(&ServerEvent::Redirect("/sync".to_string()));
                    break;
                }
                Ok(LifecycleEvent::AuthFailed) => {
                    warn!(%session_id, "messaging network authentication failed");
                    let _ = connection.publish(&ServerEvent::Redirect("/".to_string()));
                    break;
                }
                Err(e) => {
                    info!(%session_id, error = %e, "lifecycle pump ended");
                    break;
                }
            }
        }
    });
}

/// Starts a sync job for the session, unless one is already running or the
/// session is gated by an unverified purchase.
async fn handle_start_sync(
    app_state: &Arc<AppState>,
    session_id: Uuid,
    connection: &Arc<Connection>,
    options: photosync_core::domain::SyncOptions,
    sync_job_handle: &mut Option<JoinHandle<()>>,
) {
    if let Some(handle) = sync_job_handle {
        if !handle.is_finished() {
            warn!(%session_id, "sync already running, ignoring start_sync");
            return;
        }
    }

    if app_state.config.purchase_enforced() && !app_state.registry.purchased(session_id) {
        info!(%session_id, "sync refused, purchase required");
        let _ = connection.publish(&ServerEvent::Redirect("/buy".to_string()));
        return;
    }

    let Some(messaging) = app_state.registry.messaging_client(session_id) else {
        warn!(%session_id, "start_sync without a messaging client");
        let _ = connection.publish(&ServerEvent::Redirect("/".to_string()));
        return;
    };
    let Some(access_token) = app_state.registry.directory_credential(session_id) else {
        warn!(%session_id, "start_sync without a directory credential");
        let _ = connection.publish(&ServerEvent::Redirect("/auth".to_string()));
        return;
    };

    let directory = Arc::new(RestDirectoryAdapter::new(
        app_state.http.clone(),
        app_state.config.directory_api_url.clone(),
        access_token,
    ));

    *sync_job_handle = Some(tokio::spawn(sync_process(
        app_state.limiter.clone(),
        messaging,
        directory,
        connection.clone(),
        options,
        session_id,
    )));
}
