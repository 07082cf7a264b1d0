//! Per-user context stores for the server.
//!
//! The browser holds the identity-provider session; this service sees it as
//! a token on every request. Each signed-in user gets one [`ContextStore`],
//! created and initialized on their first request. A request carrying a
//! different token than the store last saw is reported to the store as a
//! token refresh. Stores nobody has asked for within the idle timeout are
//! disposed by [`SessionRegistry::evict_idle`].

use crate::config::Config;
use crate::db::PortalDirectory;
use crate::models::{AuthEvent, Session};
use crate::services::context_store::{ContextStore, StoreOptions};
use crate::services::key_storage::ContextKeyStorage;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default time a store may sit unused before [`SessionRegistry::evict_idle`] drops it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

struct SessionEntry {
    store: Arc<ContextStore>,
    last_seen: Instant,
}

pub struct SessionRegistry {
    stores: DashMap<String, SessionEntry>,
    directory: Arc<dyn PortalDirectory>,
    storage: Arc<dyn ContextKeyStorage>,
    options: StoreOptions,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        directory: Arc<dyn PortalDirectory>,
        storage: Arc<dyn ContextKeyStorage>,
        options: StoreOptions,
    ) -> Self {
        Self {
            stores: DashMap::new(),
            directory,
            storage,
            options,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn from_config(
        config: &Config,
        directory: Arc<dyn PortalDirectory>,
        storage: Arc<dyn ContextKeyStorage>,
    ) -> Self {
        let options = StoreOptions {
            init_timeout: config.context_init_timeout,
            per_user_key: config.context_key_per_user,
        };
        Self::new(directory, storage, options).with_idle_timeout(config.session_idle_timeout)
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The user's store, initialized on first use.
    ///
    /// Callers that find a store another request is still initializing wait
    /// for it to settle, bounded by the store's init timeout.
    pub async fn store_for(&self, session: &Session) -> Arc<ContextStore> {
        let (store, created) = {
            let mut created = false;
            let mut entry = self
                .stores
                .entry(session.user_id().to_string())
                .or_insert_with(|| {
                    created = true;
                    SessionEntry {
                        store: Arc::new(ContextStore::new(
                            self.directory.clone(),
                            self.storage.clone(),
                            self.options.clone(),
                        )),
                        last_seen: Instant::now(),
                    }
                });
            entry.last_seen = Instant::now();
            (entry.store.clone(), created)
        };

        if created {
            tracing::info!(user_id = session.user_id(), "Creating context store");
            store.initialize(Some(session.clone())).await;
            return store;
        }

        if !store.snapshot().phase.is_settled() {
            if tokio::time::timeout(self.options.init_timeout, store.settled())
                .await
                .is_err()
            {
                tracing::warn!(
                    user_id = session.user_id(),
                    "Context store still loading, serving current state"
                );
            }
        }

        let token_changed = store
            .session()
            .await
            .is_some_and(|known| known.access_token != session.access_token);
        if token_changed {
            tracing::debug!(user_id = session.user_id(), "Access token refreshed");
            store
                .handle_auth_event(AuthEvent::TokenRefreshed, Some(session.clone()))
                .await;
        }

        store
    }

    /// The user's store if one exists, without creating it.
    pub fn get(&self, user_id: &str) -> Option<Arc<ContextStore>> {
        self.stores.get(user_id).map(|entry| entry.store.clone())
    }

    /// Sign the user out and drop their store. Returns whether one existed.
    pub async fn sign_out(&self, user_id: &str) -> bool {
        let Some((_, entry)) = self.stores.remove(user_id) else {
            return false;
        };

        entry
            .store
            .handle_auth_event(AuthEvent::SignedOut, None)
            .await;
        entry.store.dispose().await;
        tracing::info!(user_id, "Signed out, context store dropped");
        true
    }

    /// Drop and dispose every store unused for longer than the idle timeout.
    /// Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let idle: Vec<String> = self
            .stores
            .iter()
            .filter(|entry| now.duration_since(entry.last_seen) >= self.idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for user_id in idle {
            // A request may have touched the entry since it was listed
            let removed = self.stores.remove_if(&user_id, |_, entry| {
                now.duration_since(entry.last_seen) >= self.idle_timeout
            });
            if let Some((_, entry)) = removed {
                entry.store.dispose().await;
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(
                evicted,
                remaining = self.stores.len(),
                "Dropped idle context stores"
            );
        }
        evicted
    }

    pub fn active_sessions(&self) -> usize {
        self.stores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::DirectoryRead;
    use crate::db::MemoryDirectory;
    use crate::models::{AuthUser, Context, ContextType, Relation};
    use crate::services::key_storage::MemoryKeyStorage;

    fn session(user_id: &str, token: &str) -> Session {
        Session::new(
            AuthUser {
                id: user_id.to_string(),
                email: None,
            },
            token,
        )
    }

    fn own_context() -> Context {
        Context {
            context_type: ContextType::Participant,
            profile_id: "p1".to_string(),
            profile_name: "Alex".to_string(),
            subscription_id: Some("S1".to_string()),
            group_id: "G1".to_string(),
            group_name: "Road A".to_string(),
            relation: Relation::Own,
            staff_role: None,
            roles: vec![],
        }
    }

    fn registry(directory: Arc<MemoryDirectory>) -> SessionRegistry {
        SessionRegistry::new(
            directory,
            Arc::new(MemoryKeyStorage::new()),
            StoreOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_store_is_created_once_per_user() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_contexts("u1", vec![own_context()]);
        let registry = registry(directory.clone());

        let first = registry.store_for(&session("u1", "t1")).await;
        let second = registry.store_for(&session("u1", "t1")).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.call_count(DirectoryRead::UserContexts), 1);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_new_token_triggers_rebuild_under_that_token() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_contexts("u1", vec![own_context()]);
        let registry = registry(directory.clone());

        registry.store_for(&session("u1", "t1")).await;
        registry.store_for(&session("u1", "t2")).await;

        assert_eq!(directory.call_count(DirectoryRead::UserContexts), 2);
        assert_eq!(directory.last_access_token().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_sign_out_drops_store() {
        let registry = registry(Arc::new(MemoryDirectory::new()));
        registry.store_for(&session("u1", "t1")).await;

        assert!(registry.sign_out("u1").await);
        assert!(registry.get("u1").is_none());
        assert!(!registry.sign_out("u1").await);
    }

    #[tokio::test]
    async fn test_idle_stores_are_evicted() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_contexts("u1", vec![own_context()]);
        directory.set_contexts("u2", vec![own_context()]);
        let registry = registry(directory.clone()).with_idle_timeout(Duration::from_millis(50));

        let idle = registry.store_for(&session("u1", "t1")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.store_for(&session("u2", "t2")).await;

        assert_eq!(registry.evict_idle().await, 1);
        assert!(registry.get("u1").is_none());
        assert!(registry.get("u2").is_some());
        assert_eq!(registry.active_sessions(), 1);

        // Disposed, so a late holder sees nothing
        assert!(idle.contexts().is_empty());
        assert!(idle.session().await.is_none());

        // Coming back builds a fresh store
        let fresh = registry.store_for(&session("u1", "t1")).await;
        assert!(!Arc::ptr_eq(&idle, &fresh));
        assert_eq!(fresh.contexts().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_use_keeps_store() {
        let registry = registry(Arc::new(MemoryDirectory::new()))
            .with_idle_timeout(Duration::from_secs(60));
        registry.store_for(&session("u1", "t1")).await;

        assert_eq!(registry.evict_idle().await, 0);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_both_see_settled_state() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_contexts("u1", vec![own_context()]);
        directory.delay(DirectoryRead::UserContexts, Duration::from_millis(100));
        let registry = registry(directory.clone());

        let session_a = session("u1", "t1");
        let session_b = session("u1", "t1");
        let (first, second) = tokio::join!(
            registry.store_for(&session_a),
            registry.store_for(&session_b),
        );

        for store in [first, second] {
            let state = store.snapshot();
            assert!(state.phase.is_settled());
            assert_eq!(state.contexts.len(), 1);
        }
        assert_eq!(directory.call_count(DirectoryRead::UserContexts), 1);
    }
}
