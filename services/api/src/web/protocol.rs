//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server. Every frame is a JSON envelope `{type, data}`.

use photosync_core::domain::SyncOptions;
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Start (or restart) the messaging-network login for this session.
    WhatsappConnect,

    /// Start a sync job with the given options. Options are fixed for the
    /// lifetime of the job.
    StartSync(SyncOptions),

    /// The user's verdict on the pending photo confirmation.
    SyncPhotoConfirm(ConfirmVerdict),
}

/// The kind of a client event, used to correlate a pending request/response
/// wait with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEventKind {
    WhatsappConnect,
    StartSync,
    SyncPhotoConfirm,
}

impl ClientEvent {
    pub fn kind(&self) -> ClientEventKind {
        match self {
            ClientEvent::WhatsappConnect => ClientEventKind::WhatsappConnect,
            ClientEvent::StartSync(_) => ClientEventKind::StartSync,
            ClientEvent::SyncPhotoConfirm(_) => ClientEventKind::SyncPhotoConfirm,
        }
    }
}

/// Payload of `sync_photo_confirm`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmVerdict {
    pub accept: bool,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A login QR code the client should render for scanning.
    WhatsappQr(String),

    /// The QR was scanned; the messaging client is establishing its session.
    WhatsappConnecting(()),

    /// Instructs the client to navigate to the given path.
    Redirect(String),

    /// Running progress of a sync job. Also the terminal event of a job,
    /// either at 100% or carrying a non-null `error`.
    SyncProgress(SyncProgress),

    /// Asks the user to accept or reject one contact's new photo.
    SyncConfirm(ConfirmRequest),
}

/// Payload of `sync_progress`.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub progress: u32,
    pub sync_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_contacts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Always present: `null` while the job is healthy.
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_manual_sync: Option<bool>,
}

/// Payload of `sync_confirm`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_photo: Option<String>,
    pub new_photo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_events_use_type_data_envelope() {
        let event = ServerEvent::WhatsappQr("qr-payload".into());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "whatsapp_qr", "data": "qr-payload"}));

        let event = ServerEvent::WhatsappConnecting(());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "whatsapp_connecting", "data": null}));
    }

    #[test]
    fn sync_progress_keeps_null_error_and_camel_case_fields() {
        let event = ServerEvent::SyncProgress(SyncProgress {
            progress: 50,
            sync_count: 2,
            total_contacts: Some(4),
            image: None,
            error: None,
            is_manual_sync: Some(false),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "sync_progress",
                "data": {
                    "progress": 50,
                    "syncCount": 2,
                    "totalContacts": 4,
                    "error": null,
                    "isManualSync": false
                }
            })
        );
    }

    #[test]
    fn client_events_parse_from_envelope() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "start_sync",
            "data": {"manualSync": true, "overwritePhotos": false}
        }))
        .unwrap();
        match event {
            ClientEvent::StartSync(options) => {
                assert!(options.manual_sync);
                assert!(!options.overwrite_photos);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event: ClientEvent = serde_json::from_value(json!({
            "type": "sync_photo_confirm",
            "data": {"accept": true}
        }))
        .unwrap();
        assert_eq!(event.kind(), ClientEventKind::SyncPhotoConfirm);

        let event: ClientEvent =
            serde_json::from_value(json!({"type": "whatsapp_connect", "data": null})).unwrap();
        assert_eq!(event.kind(), ClientEventKind::WhatsappConnect);
    }

    #[test]
    fn unknown_event_type_is_a_parse_error() {
        let result = serde_json::from_value::<ClientEvent>(json!({
            "type": "mystery_event",
            "data": {}
        }));
        assert!(result.is_err());
    }
}
