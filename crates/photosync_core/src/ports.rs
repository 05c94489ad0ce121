//! crates/photosync_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like the messaging
//! bridge or the contact-directory API.

use async_trait::async_trait;

use crate::domain::{DirectoryContact, LifecycleEvent, MessagingIndex};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, auth).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A live client session on the external messaging network.
///
/// One instance corresponds to one authenticated (or authenticating) user.
/// All async operations fail with `PortError::Unavailable` once the client
/// has been shut down.
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Waits for the next lifecycle event of the underlying client.
    ///
    /// Events arrive in login order: zero or more `QrReady`, then
    /// `Connecting`, then `Ready` or `AuthFailed`.
    async fn next_lifecycle_event(&self) -> PortResult<LifecycleEvent>;

    /// Returns the user's full contact index, keyed by canonical phone number.
    async fn load_contacts(&self) -> PortResult<MessagingIndex>;

    /// Downloads the profile photo of the given identity as base64 bytes.
    ///
    /// Returns `Ok(None)` when the identity has no photo available.
    async fn download_photo(&self, identity: &str) -> PortResult<Option<String>>;

    /// Tears the client down.
    ///
    /// Must be synchronous and idempotent: it is invoked from resource
    /// release paths that cannot await.
    fn shutdown(&self);
}

/// The external contact directory the photos are synced into.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Lists every contact that has at least one phone number.
    ///
    /// Numbers are canonical: digits only, no leading `+`, no separators.
    /// Implementations follow pagination internally and return the full set.
    async fn list_contacts(&self) -> PortResult<Vec<DirectoryContact>>;

    /// Replaces the photo of the given contact with the supplied base64 bytes.
    async fn update_photo(&self, contact_id: &str, photo_b64: &str) -> PortResult<()>;

    /// Fetches a contact's current photo bytes from its photo URL.
    ///
    /// Returns `Ok(None)` when the photo cannot be retrieved.
    async fn fetch_photo(&self, photo_url: &str) -> PortResult<Option<String>>;
}

/// Verifies that an email address belongs to a paying customer.
#[async_trait]
pub trait PurchaseService: Send + Sync {
    async fn is_purchased(&self, email: &str) -> PortResult<bool>;
}
