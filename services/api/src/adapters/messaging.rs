//! services/api/src/adapters/messaging.rs
//!
//! This module contains the adapter for the messaging-network bridge, a
//! sidecar service that owns the actual WhatsApp Web sessions. It implements
//! the `MessagingService` port from the `core` crate over the bridge's HTTP
//! API.

use async_trait::async_trait;
use photosync_core::domain::{LifecycleEvent, MessagingIndex};
use photosync_core::ports::{MessagingService, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Interval between two lifecycle-status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

//=========================================================================================
// Bridge Wire Types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateClientRequest {
    session_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateClientResponse {
    client_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: String,
    qr: Option<String>,
}

#[derive(Deserialize)]
struct ContactsResponse {
    contacts: Vec<BridgeContact>,
}

#[derive(Deserialize)]
struct BridgeContact {
    number: String,
    id: String,
}

#[derive(Deserialize)]
struct PhotoResponse {
    photo: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A live client session on the bridge.
///
/// Holds a `CancellationToken` so the registry can tear the client down
/// synchronously; every call fails fast once the token is cancelled.
pub struct BridgeMessagingClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    shutdown: CancellationToken,
    /// The last state string reported to the caller, so the poll loop only
    /// surfaces transitions.
    last_reported: Mutex<Option<String>>,
}

impl BridgeMessagingClient {
    /// Asks the bridge to create a fresh client for the session.
    pub async fn connect(
        http: reqwest::Client,
        base_url: String,
        session_id: Uuid,
    ) -> PortResult<Arc<Self>> {
        let response = http
            .post(format!("{base_url}/clients"))
            .json(&CreateClientRequest { session_id })
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "bridge refused client creation: {}",
                response.status()
            )));
        }
        let created: CreateClientResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Arc::new(Self {
            http,
            base_url,
            client_id: created.client_id,
            shutdown: CancellationToken::new(),
            last_reported: Mutex::new(None),
        }))
    }

    fn ensure_live(&self) -> PortResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(PortError::Unavailable(
                "messaging client has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        self.ensure_live()?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "bridge returned {} for {}",
                response.status(),
                path
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

//=========================================================================================
// `MessagingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessagingService for BridgeMessagingClient {
    /// Polls the bridge until the client's lifecycle state changes.
    async fn next_lifecycle_event(&self) -> PortResult<LifecycleEvent> {
        loop {
            let status: StatusResponse = self
                .get_json(&format!("/clients/{}/status", self.client_id))
                .await?;

            let changed = {
                let mut last = self.last_reported.lock().unwrap();
                // QR codes rotate, so a repeated "qr" state with a fresh code
                // is still a transition.
                let snapshot = match (&status.state[..], &status.qr) {
                    ("qr", Some(qr)) => format!("qr:{qr}"),
                    (state, _) => state.to_string(),
                };
                if last.as_deref() == Some(snapshot.as_str()) {
                    false
                } else {
                    *last = Some(snapshot);
                    true
                }
            };

            if changed {
                return match (&status.state[..], status.qr) {
                    ("qr", Some(qr)) => Ok(LifecycleEvent::QrReady(qr)),
                    ("connecting", _) => Ok(LifecycleEvent::Connecting),
                    ("ready", _) => Ok(LifecycleEvent::Ready),
                    ("auth_failed", _) => Ok(LifecycleEvent::AuthFailed),
                    (other, _) => Err(PortError::Unexpected(format!(
                        "bridge reported unknown client state '{other}'"
                    ))),
                };
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(PortError::Unavailable(
                        "messaging client has been shut down".to_string(),
                    ));
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn load_contacts(&self) -> PortResult<MessagingIndex> {
        let response: ContactsResponse = self
            .get_json(&format!("/clients/{}/contacts", self.client_id))
            .await?;
        Ok(response
            .contacts
            .into_iter()
            .map(|c| (c.number, c.id))
            .collect())
    }

    async fn download_photo(&self, identity: &str) -> PortResult<Option<String>> {
        self.ensure_live()?;
        let response = self
            .http
            .get(format!(
                "{}/clients/{}/contacts/{}/photo",
                self.base_url, self.client_id, identity
            ))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "bridge returned {} for photo of {}",
                response.status(),
                identity
            )));
        }
        let photo: PhotoResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(photo.photo))
    }

    /// Tears the client down. Synchronous and idempotent; the bridge-side
    /// client is destroyed best-effort in the background.
    fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        debug!(client = %self.client_id, "shutting down messaging client");

        let http = self.http.clone();
        let url = format!("{}/clients/{}", self.base_url, self.client_id);
        tokio::spawn(async move {
            if let Err(e) = http.delete(&url).send().await {
                debug!(error = %e, "failed to destroy bridge client");
            }
        });
    }
}
