//! crates/photosync_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or serialization format,
//! except where a field name is part of the client-facing wire contract.

use serde::Deserialize;
use std::collections::HashMap;

/// A mapping from canonical phone number (digits only, no leading `+`) to
/// the opaque identity of that user on the messaging network.
pub type MessagingIndex = HashMap<String, String>;

/// A contact record from the external contact directory, the sync target.
///
/// Read-only snapshot for the duration of one sync job.
#[derive(Debug, Clone)]
pub struct DirectoryContact {
    pub id: String,
    pub name: Option<String>,
    /// Canonical phone numbers, in the order the directory returned them.
    pub numbers: Vec<String>,
    pub has_photo: bool,
    pub photo_url: Option<String>,
}

/// Options fixed at job creation; immutable for the lifetime of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub manual_sync: bool,
    pub overwrite_photos: bool,
}

/// Output of the contact matching engine. Recomputed per contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub identity: Option<String>,
}

impl MatchResult {
    pub fn unmatched() -> Self {
        Self {
            matched: false,
            identity: None,
        }
    }

    pub fn matched(identity: String) -> Self {
        Self {
            matched: true,
            identity: Some(identity),
        }
    }
}

/// Lifecycle notifications emitted by a messaging-network client while it
/// authenticates and comes online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A login QR code is ready to be shown to the user.
    QrReady(String),
    /// The QR was scanned; the client is establishing its session.
    Connecting,
    /// The client is authenticated and ready to serve contact data.
    Ready,
    /// Authentication failed; the client is unusable.
    AuthFailed,
}
