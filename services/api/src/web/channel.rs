//! services/api/src/web/channel.rs
//!
//! The real-time messaging channel for one attached WebSocket connection.
//!
//! Supports fire-and-forget `publish` and the blocking `request_and_await`
//! pattern used for per-contact confirmations. The socket writer task owns
//! the actual sink; this endpoint only enqueues frames, so publishing never
//! blocks the orchestrator.

use crate::web::protocol::{ClientEvent, ClientEventKind, ServerEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// How long a `request_and_await` caller waits for the expected reply.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection closed")]
    Closed,
    #[error("timed out waiting for {0:?}")]
    TimedOut(ClientEventKind),
    #[error("a request is already awaiting a response on this connection")]
    WaitInProgress,
}

/// A frame handed to the socket writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    /// A pre-serialized `{type, data}` event.
    Event(String),
    /// Close the socket and stop the writer.
    Close,
}

/// The single outstanding request/response wait of a connection.
///
/// Arrival of a matching message or expiry of the caller's timeout are the
/// only two ways the slot is cleared; the mutex makes them mutually exclusive.
struct PendingWait {
    expect: ClientEventKind,
    reply: oneshot::Sender<ClientEvent>,
}

/// One attached connection endpoint.
pub struct Connection {
    id: Uuid,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    pending: Mutex<Option<PendingWait>>,
}

impl Connection {
    /// Creates a connection endpoint plus the frame stream its writer task drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (outbound, frames) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            outbound,
            pending: Mutex::new(None),
        });
        (connection, frames)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Fire-and-forget publish. Never blocks; fails only once the writer task
    /// is gone.
    pub fn publish(&self, event: &ServerEvent) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(event).unwrap();
        self.outbound
            .send(OutboundFrame::Event(frame))
            .map_err(|_| ChannelError::Closed)
    }

    /// Publishes `event`, then suspends until an inbound message of kind
    /// `expect` arrives or `timeout` elapses.
    ///
    /// Only one wait is valid per connection at a time; a second concurrent
    /// call is a usage error.
    pub async fn request_and_await(
        &self,
        event: &ServerEvent,
        expect: ClientEventKind,
        timeout: Duration,
    ) -> Result<ClientEvent, ChannelError> {
        let rx = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_some() {
                return Err(ChannelError::WaitInProgress);
            }
            let (reply, rx) = oneshot::channel();
            *pending = Some(PendingWait { expect, reply });
            rx
        };

        if let Err(e) = self.publish(event) {
            self.pending.lock().unwrap().take();
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                // The sender was dropped without firing: the connection was
                // torn down while we waited.
                self.pending.lock().unwrap().take();
                Err(ChannelError::Closed)
            }
            Err(_) => {
                self.pending.lock().unwrap().take();
                Err(ChannelError::TimedOut(expect))
            }
        }
    }

    /// Offers an inbound event to the pending wait slot.
    ///
    /// Returns `None` when the event resolved the wait, or gives the event
    /// back for regular handler dispatch.
    pub fn resolve(&self, event: ClientEvent) -> Option<ClientEvent> {
        let waiter = {
            let mut pending = self.pending.lock().unwrap();
            match pending.as_ref() {
                Some(wait) if wait.expect == event.kind() => pending.take(),
                _ => None,
            }
        };
        match waiter {
            Some(wait) => {
                if wait.reply.send(event).is_err() {
                    debug!("pending wait resolved after its requester gave up");
                }
                None
            }
            None => Some(event),
        }
    }

    /// Closes the connection. Idempotent; any pending wait is aborted.
    pub fn close(&self) {
        let _ = self.outbound.send(OutboundFrame::Close);
        self.pending.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::protocol::ConfirmVerdict;

    fn progress_event() -> ServerEvent {
        ServerEvent::SyncProgress(Default::default())
    }

    #[tokio::test]
    async fn request_resolves_when_matching_reply_arrives() {
        let (connection, mut frames) = Connection::new();

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request_and_await(
                        &progress_event(),
                        ClientEventKind::SyncPhotoConfirm,
                        REQUEST_TIMEOUT,
                    )
                    .await
            })
        };

        // The request frame is published before the wait resolves.
        let frame = frames.recv().await.unwrap();
        assert!(matches!(frame, OutboundFrame::Event(_)));

        let leftover =
            connection.resolve(ClientEvent::SyncPhotoConfirm(ConfirmVerdict { accept: true }));
        assert!(leftover.is_none());

        let reply = waiter.await.unwrap().unwrap();
        match reply {
            ClientEvent::SyncPhotoConfirm(verdict) => assert!(verdict.accept),
            other => panic!("unexpected reply: {other:?}"),
        }

        // The slot is free again.
        assert!(connection.pending.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_and_clears_the_slot() {
        let (connection, _frames) = Connection::new();

        let result = connection
            .request_and_await(
                &progress_event(),
                ClientEventKind::SyncPhotoConfirm,
                Duration::from_secs(30),
            )
            .await;
        assert!(matches!(result, Err(ChannelError::TimedOut(_))));
        assert!(connection.pending.lock().unwrap().is_none());

        // A later reply no longer finds a waiter and falls through to dispatch.
        let leftover =
            connection.resolve(ClientEvent::SyncPhotoConfirm(ConfirmVerdict { accept: true }));
        assert!(leftover.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn second_concurrent_request_is_a_usage_error() {
        let (connection, _frames) = Connection::new();

        let first = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request_and_await(
                        &progress_event(),
                        ClientEventKind::SyncPhotoConfirm,
                        Duration::from_secs(30),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = connection
            .request_and_await(
                &progress_event(),
                ClientEventKind::SyncPhotoConfirm,
                Duration::from_secs(30),
            )
            .await;
        assert!(matches!(second, Err(ChannelError::WaitInProgress)));

        // Let the first wait run out.
        assert!(matches!(
            first.await.unwrap(),
            Err(ChannelError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn mismatched_event_does_not_resolve_the_wait() {
        let (connection, _frames) = Connection::new();

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request_and_await(
                        &progress_event(),
                        ClientEventKind::SyncPhotoConfirm,
                        REQUEST_TIMEOUT,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        // An unrelated event is handed back for handler dispatch.
        let leftover = connection.resolve(ClientEvent::WhatsappConnect);
        assert!(leftover.is_some());

        // The matching one resolves.
        let leftover =
            connection.resolve(ClientEvent::SyncPhotoConfirm(ConfirmVerdict { accept: false }));
        assert!(leftover.is_none());
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn publish_fails_once_the_writer_is_gone() {
        let (connection, frames) = Connection::new();
        drop(frames);
        assert!(matches!(
            connection.publish(&progress_event()),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_emits_a_close_frame_and_aborts_pending_waits() {
        let (connection, mut frames) = Connection::new();

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request_and_await(
                        &progress_event(),
                        ClientEventKind::SyncPhotoConfirm,
                        REQUEST_TIMEOUT,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        connection.close();
        connection.close(); // idempotent

        assert!(matches!(waiter.await.unwrap(), Err(ChannelError::Closed)));

        // Skip the published request frame, then expect the close frame.
        let mut saw_close = false;
        while let Some(frame) = frames.recv().await {
            if matches!(frame, OutboundFrame::Close) {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close);
    }
}
