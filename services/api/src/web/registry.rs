//! services/api/src/web/registry.rs
//!
//! The per-session resource registry: a single flat store of ephemeral
//! session resources (messaging client, directory credential, live
//! connection, purchase state) with idle expiry, a process-wide capacity
//! bound, and deferred per-session teardown.
//!
//! Every stored resource carries a uniform release capability which is
//! invoked on eviction, expiry, or explicit deletion — release is
//! synchronous and idempotent.

use crate::web::channel::Connection;
use photosync_core::ports::MessagingService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Idle TTL after which a session's entries expire.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Grace period between a disconnect and the session's deferred teardown.
pub const CLEANUP_GRACE: Duration = Duration::from_secs(5 * 60);

/// The namespaced key of one per-session entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    MessagingClient,
    DirectoryCredential,
    Connection,
    Purchased,
    VerifiedEmail,
}

/// One stored per-session resource.
///
/// A closed enumeration: adding a resource type forces a decision about how
/// it is released.
#[derive(Clone)]
pub enum Resource {
    MessagingClient(Arc<dyn MessagingService>),
    DirectoryCredential(String),
    Connection(Arc<Connection>),
    Purchased(bool),
    VerifiedEmail(String),
}

impl Resource {
    /// Releases the owned external resource. Synchronous and idempotent.
    fn release(&self) {
        match self {
            Resource::MessagingClient(client) => client.shutdown(),
            Resource::Connection(connection) => connection.close(),
            Resource::DirectoryCredential(_)
            | Resource::Purchased(_)
            | Resource::VerifiedEmail(_) => {}
        }
    }
}

struct Entry {
    value: Resource,
    expires_at: Instant,
    ttl: Duration,
    last_used: u64,
}

struct Store {
    entries: HashMap<(Uuid, ResourceKey), Entry>,
    /// Monotonic access counter backing the LRU ordering.
    tick: u64,
}

struct PendingCleanup {
    id: u64,
    handle: JoinHandle<()>,
}

/// Process-wide registry shared by all sessions.
pub struct SessionRegistry {
    store: Mutex<Store>,
    cleanups: Mutex<HashMap<Uuid, PendingCleanup>>,
    next_cleanup_id: AtomicU64,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                tick: 0,
            }),
            cleanups: Mutex::new(HashMap::new()),
            next_cleanup_id: AtomicU64::new(0),
            capacity,
        })
    }

    /// Stores a resource under the session's namespace.
    ///
    /// A previous entry under the same key is released first. Inserting past
    /// capacity releases exactly one least-recently-used victim (from any
    /// session) before admitting the new entry.
    pub fn put(&self, session: Uuid, key: ResourceKey, value: Resource, ttl: Duration) {
        let mut store = self.store.lock().unwrap();
        store.tick += 1;
        let tick = store.tick;
        let now = Instant::now();

        if let Some(old) = store.entries.remove(&(session, key)) {
            old.value.release();
        }

        // Expired entries free their slots before eviction is considered.
        let expired: Vec<(Uuid, ResourceKey)> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| *k)
            .collect();
        for k in expired {
            if let Some(entry) = store.entries.remove(&k) {
                debug!(session = %k.0, key = ?k.1, "session entry expired");
                entry.value.release();
            }
        }

        if store.entries.len() >= self.capacity {
            let victim = store
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k);
            if let Some(victim) = victim {
                if let Some(entry) = store.entries.remove(&victim) {
                    info!(session = %victim.0, key = ?victim.1, "evicting least-recently-used session entry");
                    entry.value.release();
                }
            }
        }

        store.entries.insert(
            (session, key),
            Entry {
                value,
                expires_at: now + ttl,
                ttl,
                last_used: tick,
            },
        );
    }

    /// Looks up a resource, refreshing its idle TTL and LRU position.
    ///
    /// An expired entry is released and reported as absent.
    pub fn get(&self, session: Uuid, key: ResourceKey) -> Option<Resource> {
        let mut store = self.store.lock().unwrap();
        store.tick += 1;
        let tick = store.tick;
        let now = Instant::now();

        if let Some(entry) = store.entries.get_mut(&(session, key)) {
            if entry.expires_at > now {
                entry.last_used = tick;
                entry.expires_at = now + entry.ttl;
                return Some(entry.value.clone());
            }
        }
        if let Some(entry) = store.entries.remove(&(session, key)) {
            debug!(%session, ?key, "session entry expired");
            entry.value.release();
        }
        None
    }

    /// Removes a resource, releasing it.
    pub fn delete(&self, session: Uuid, key: ResourceKey) {
        let removed = self.store.lock().unwrap().entries.remove(&(session, key));
        if let Some(entry) = removed {
            entry.value.release();
        }
    }

    /// Schedules the session's deferred teardown after `delay`, superseding
    /// any previously scheduled one.
    pub fn schedule_cleanup(self: Arc<Self>, session: Uuid, delay: Duration) {
        let id = self.next_cleanup_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // Fire only while still the registered cleanup for the session.
                let mut cleanups = registry.cleanups.lock().unwrap();
                match cleanups.get(&session) {
                    Some(pending) if pending.id == id => {
                        cleanups.remove(&session);
                    }
                    _ => return,
                }
            }
            info!(%session, "cleanup grace period elapsed, destroying session resources");
            registry.destroy_session_resources(session);
        });

        let mut cleanups = self.cleanups.lock().unwrap();
        if let Some(previous) = cleanups.insert(session, PendingCleanup { id, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancels a scheduled teardown, if any. A reconnect within the grace
    /// window calls this before re-attaching.
    pub fn cancel_cleanup(&self, session: Uuid) {
        if let Some(pending) = self.cleanups.lock().unwrap().remove(&session) {
            pending.handle.abort();
        }
    }

    /// Destroys the session's live resources. Purchase-verification state
    /// survives teardown.
    pub fn destroy_session_resources(&self, session: Uuid) {
        self.delete(session, ResourceKey::MessagingClient);
        self.delete(session, ResourceKey::DirectoryCredential);
        self.delete(session, ResourceKey::Connection);
    }

    // --- Typed accessors used by the handlers ---

    pub fn messaging_client(&self, session: Uuid) -> Option<Arc<dyn MessagingService>> {
        match self.get(session, ResourceKey::MessagingClient) {
            Some(Resource::MessagingClient(client)) => Some(client),
            _ => None,
        }
    }

    pub fn directory_credential(&self, session: Uuid) -> Option<String> {
        match self.get(session, ResourceKey::DirectoryCredential) {
            Some(Resource::DirectoryCredential(token)) => Some(token),
            _ => None,
        }
    }

    pub fn connection(&self, session: Uuid) -> Option<Arc<Connection>> {
        match self.get(session, ResourceKey::Connection) {
            Some(Resource::Connection(connection)) => Some(connection),
            _ => None,
        }
    }

    /// Whether the session has a verified purchase. Only consulted when
    /// payment enforcement is active; absent state means not purchased.
    pub fn purchased(&self, session: Uuid) -> bool {
        matches!(
            self.get(session, ResourceKey::Purchased),
            Some(Resource::Purchased(true))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::channel::OutboundFrame;
    use async_trait::async_trait;
    use photosync_core::domain::{LifecycleEvent, MessagingIndex};
    use photosync_core::ports::{PortError, PortResult};
    use std::sync::atomic::AtomicUsize;

    /// A messaging client stub that only counts shutdowns.
    struct StubClient {
        released: Arc<AtomicUsize>,
    }

    impl StubClient {
        fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
            let released = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    released: released.clone(),
                }),
                released,
            )
        }
    }

    #[async_trait]
    impl MessagingService for StubClient {
        async fn next_lifecycle_event(&self) -> PortResult<LifecycleEvent> {
            Err(PortError::Unavailable("stub".into()))
        }
        async fn load_contacts(&self) -> PortResult<MessagingIndex> {
            Err(PortError::Unavailable("stub".into()))
        }
        async fn download_photo(&self, _identity: &str) -> PortResult<Option<String>> {
            Err(PortError::Unavailable("stub".into()))
        }
        fn shutdown(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn put_client(registry: &SessionRegistry, session: Uuid) -> Arc<AtomicUsize> {
        let (client, released) = StubClient::new();
        registry.put(
            session,
            ResourceKey::MessagingClient,
            Resource::MessagingClient(client),
            SESSION_TTL,
        );
        released
    }

    #[tokio::test]
    async fn get_returns_what_put_stored() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        put_client(&registry, session);
        assert!(registry.messaging_client(session).is_some());
        assert!(registry.messaging_client(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn replacing_an_entry_releases_the_previous_one() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let first = put_client(&registry, session);
        let second = put_client(&registry, session);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insertion_past_capacity_evicts_exactly_one_lru_victim() {
        let registry = SessionRegistry::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let released_a = put_client(&registry, a);
        let released_b = put_client(&registry, b);

        // Touch `a` so `b` becomes the least recently used.
        assert!(registry.messaging_client(a).is_some());

        let released_c = put_client(&registry, c);
        assert_eq!(released_a.load(Ordering::SeqCst), 0);
        assert_eq!(released_b.load(Ordering::SeqCst), 1);
        assert_eq!(released_c.load(Ordering::SeqCst), 0);
        assert!(registry.messaging_client(b).is_none());
        assert!(registry.messaging_client(a).is_some());
        assert!(registry.messaging_client(c).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entries_expire_and_are_released() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let released = put_client(&registry, session);

        tokio::time::advance(SESSION_TTL + Duration::from_secs(1)).await;
        assert!(registry.messaging_client(session).is_none());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn access_refreshes_the_idle_ttl() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        put_client(&registry, session);

        tokio::time::advance(SESSION_TTL - Duration::from_secs(1)).await;
        assert!(registry.messaging_client(session).is_some());
        tokio::time::advance(SESSION_TTL - Duration::from_secs(1)).await;
        assert!(registry.messaging_client(session).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_cleanup_destroys_live_resources_but_keeps_purchase_state() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let released = put_client(&registry, session);
        registry.put(
            session,
            ResourceKey::Purchased,
            Resource::Purchased(true),
            SESSION_TTL,
        );

        registry.clone().schedule_cleanup(session, CLEANUP_GRACE);
        tokio::time::advance(CLEANUP_GRACE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(registry.messaging_client(session).is_none());
        assert!(registry.purchased(session));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_cancels_the_teardown() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let released = put_client(&registry, session);

        registry.clone().schedule_cleanup(session, CLEANUP_GRACE);
        tokio::time::advance(Duration::from_secs(60)).await;
        registry.cancel_cleanup(session);
        tokio::time::advance(CLEANUP_GRACE).await;
        tokio::task::yield_now().await;

        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert!(registry.messaging_client(session).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_supersedes_the_previous_cleanup() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let released = put_client(&registry, session);

        registry.clone().schedule_cleanup(session, Duration::from_secs(10));
        registry.clone().schedule_cleanup(session, CLEANUP_GRACE);

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(released.load(Ordering::SeqCst), 0);

        tokio::time::advance(CLEANUP_GRACE).await;
        tokio::task::yield_now().await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releasing_a_connection_entry_closes_it() {
        let registry = SessionRegistry::new(8);
        let session = Uuid::new_v4();
        let (connection, mut frames) = Connection::new();
        registry.put(
            session,
            ResourceKey::Connection,
            Resource::Connection(connection),
            SESSION_TTL,
        );

        // A newer connection replaces the stale one, which gets closed.
        let (replacement, _frames) = Connection::new();
        registry.put(
            session,
            ResourceKey::Connection,
            Resource::Connection(replacement),
            SESSION_TTL,
        );

        let frame = frames.recv().await.unwrap();
        assert!(matches!(frame, OutboundFrame::Close));
    }
}
