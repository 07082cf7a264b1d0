// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Context store: which hat the signed-in user is currently wearing.
//!
//! Holds the user's contexts, the active one and its group, and publishes
//! them through a `watch` channel so views can derive from the current
//! value instead of polling. Lifecycle is `new → initialize → dispose`.
//!
//! Every load (initialize, refetch, auth event) takes a new generation
//! number; results from a generation that is no longer the latest are
//! dropped, so a slow stale load can never overwrite a newer one.
//!
//! Data-store failures never escape: they become an empty or neutral state
//! plus a [`Degradation`] marker the UI may surface.

use crate::db::PortalDirectory;
use crate::models::{
    AccountFlags, AuthEvent, AuthUser, CalendarScope, Context, ContextKey, GroupSnapshot,
    Relation, Session,
};
use crate::services::key_storage::{active_context_slot, ContextKeyStorage};
use crate::services::notifier::{ContextChangeNotifier, ContextSubscription};
use crate::services::permissions;
use crate::services::repository::{ContextRepository, GroupFetcher};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where the store is in its load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    #[default]
    Uninitialized,
    Loading,
    /// Settled. Also the phase when there is no session at all.
    Ready,
    /// Settled for a signed-in user who has no contexts.
    Empty,
}

impl LoadPhase {
    pub fn is_settled(self) -> bool {
        matches!(self, LoadPhase::Ready | LoadPhase::Empty)
    }
}

/// Why the current state may be less than the full picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Degradation {
    /// The context list could not be read; the list shown is empty.
    ContextsUnavailable(String),
    /// The data store refused the session's token; the list shown is empty.
    SessionRejected(String),
    /// The active group could not be read; `active_group` is `None`.
    GroupUnavailable(String),
    /// Initialization hit its time ceiling; state is whatever had arrived.
    TimedOut,
}

/// Everything views read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextState {
    pub phase: LoadPhase,
    pub user: Option<AuthUser>,
    pub contexts: Vec<Context>,
    pub active_context: Option<Context>,
    pub active_group: Option<GroupSnapshot>,
    pub degraded: Option<Degradation>,
}

impl ContextState {
    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    pub fn active_key(&self) -> Option<ContextKey> {
        self.active_context.as_ref().map(Context::identity_key)
    }
}

/// Tunables for a [`ContextStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Ceiling on the whole initialize sequence.
    pub init_timeout: Duration,
    /// Namespace the persisted context key by user id.
    pub per_user_key: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(crate::config::DEFAULT_CONTEXT_INIT_TIMEOUT_SECS),
            per_user_key: true,
        }
    }
}

/// Pick the context to activate from a freshly fetched list.
///
/// The persisted key wins if it matches; otherwise the user's own (`self`)
/// context; otherwise the first one returned.
pub fn select_active_context<'a>(
    contexts: &'a [Context],
    persisted_key: Option<&str>,
) -> Option<&'a Context> {
    if let Some(key) = persisted_key {
        if let Some(found) = contexts.iter().find(|c| c.identity_key() == key) {
            return Some(found);
        }
    }

    contexts
        .iter()
        .find(|c| c.relation == Relation::Own)
        .or_else(|| contexts.first())
}

fn settled_phase(contexts: &[Context]) -> LoadPhase {
    if contexts.is_empty() {
        LoadPhase::Empty
    } else {
        LoadPhase::Ready
    }
}

/// Per-user context state container.
pub struct ContextStore {
    repository: ContextRepository,
    groups: GroupFetcher,
    storage: Arc<dyn ContextKeyStorage>,
    notifier: ContextChangeNotifier,
    state: watch::Sender<ContextState>,
    flags: watch::Sender<AccountFlags>,
    session: RwLock<Option<Session>>,
    /// Latest load started; older loads may not write state.
    generation: AtomicU64,
    /// Bumped by every explicit context switch.
    selection_epoch: AtomicU64,
    /// Set by `initialize`, consumed by the first `InitialSession` event.
    skip_initial_session: AtomicBool,
    /// The account-flag lookup for the current user has completed.
    flags_resolved: AtomicBool,
    options: StoreOptions,
}

impl ContextStore {
    pub fn new(
        directory: Arc<dyn PortalDirectory>,
        storage: Arc<dyn ContextKeyStorage>,
        options: StoreOptions,
    ) -> Self {
        let (state, _) = watch::channel(ContextState::default());
        let (flags, _) = watch::channel(AccountFlags::default());

        Self {
            repository: ContextRepository::new(directory.clone()),
            groups: GroupFetcher::new(directory),
            storage,
            notifier: ContextChangeNotifier::new(),
            state,
            flags,
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            selection_epoch: AtomicU64::new(0),
            skip_initial_session: AtomicBool::new(false),
            flags_resolved: AtomicBool::new(false),
            options,
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Resolve contexts for the session found at startup, if any.
    pub async fn initialize(&self, session: Option<Session>) {
        self.skip_initial_session.store(true, Ordering::SeqCst);
        self.rebuild(session).await;
    }

    /// Rebuild from the data store under the current session.
    pub async fn refetch(&self) {
        let session = self.session.read().await.clone();
        self.rebuild(session).await;
    }

    /// React to an identity-provider state change.
    pub async fn handle_auth_event(&self, event: AuthEvent, session: Option<Session>) {
        match event {
            AuthEvent::InitialSession if self.skip_initial_session.swap(false, Ordering::SeqCst) => {
                tracing::debug!("Initial session already handled by initialize, ignoring");
            }
            AuthEvent::SignedOut => {
                self.skip_initial_session.store(false, Ordering::SeqCst);
                self.rebuild(None).await;
            }
            _ => {
                self.skip_initial_session.store(false, Ordering::SeqCst);
                tracing::debug!(?event, "Auth state changed, rebuilding contexts");
                self.rebuild(session).await;
            }
        }
    }

    /// Drop all state and abandon in-flight loads. The store is not reused.
    pub async fn dispose(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.session.write().await = None;
        self.flags_resolved.store(false, Ordering::SeqCst);
        self.state.send_replace(ContextState::default());
        self.flags.send_replace(AccountFlags::default());
    }

    // ─── Context switching ───────────────────────────────────────

    /// Make `context` the active one.
    ///
    /// The switch itself always completes: state updates and subscribers are
    /// notified first, then the key is persisted and the group fetched. A
    /// group that cannot be fetched only leaves `active_group` empty.
    pub async fn set_active_context(&self, context: Context) {
        let key = context.identity_key();
        self.selection_epoch.fetch_add(1, Ordering::SeqCst);

        self.state.send_modify(|s| {
            let same_group = s
                .active_context
                .as_ref()
                .is_some_and(|active| active.group_id == context.group_id);
            if !same_group {
                s.active_group = None;
            }
            s.active_context = Some(context.clone());
        });

        let subscribers = self.notifier.emit(context.clone());
        tracing::info!(
            context_key = %key,
            group_id = %context.group_id,
            subscribers,
            "Active context switched"
        );

        let session = self.session.read().await.clone();
        self.persist_key(session.as_ref().map(Session::user_id), &key)
            .await;

        let Some(session) = session else {
            return;
        };

        let (group, failure) = match self.groups.fetch_group(&session, &context.group_id).await {
            Ok(group) => (group, None),
            Err(e) => (None, Some(Degradation::GroupUnavailable(e.to_string()))),
        };

        let applied = self.state.send_if_modified(|s| {
            if s.active_key().as_ref() != Some(&key) {
                return false;
            }
            s.active_group = group;
            match failure {
                Some(d) => s.degraded = Some(d),
                None if matches!(s.degraded, Some(Degradation::GroupUnavailable(_))) => {
                    s.degraded = None
                }
                None => {}
            }
            true
        });

        if !applied {
            tracing::debug!(context_key = %key, "Context switched again before group arrived");
        }
    }

    /// Switch to the context with identity key `key`, if the user has one.
    pub async fn set_active_context_by_key(&self, key: &str) -> Option<Context> {
        let context = self.find_context(key)?;
        self.set_active_context(context.clone()).await;
        Some(context)
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub fn snapshot(&self) -> ContextState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<ContextState> {
        self.state.subscribe()
    }

    pub fn watch_account_flags(&self) -> watch::Receiver<AccountFlags> {
        self.flags.subscribe()
    }

    /// Wait until the store has settled, then return its state.
    ///
    /// Only meaningful after `initialize` has been called.
    pub async fn settled(&self) -> ContextState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| s.phase.is_settled()).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        state
    }

    pub fn subscribe(&self) -> ContextSubscription {
        self.notifier.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.state.borrow().contexts.clone()
    }

    pub fn active_context(&self) -> Option<Context> {
        self.state.borrow().active_context.clone()
    }

    pub fn active_group(&self) -> Option<GroupSnapshot> {
        self.state.borrow().active_group.clone()
    }

    pub fn find_context(&self, key: &str) -> Option<Context> {
        self.state
            .borrow()
            .contexts
            .iter()
            .find(|c| c.identity_key() == key)
            .cloned()
    }

    // ─── Roles & permissions ─────────────────────────────────────

    pub fn is_coach(&self) -> bool {
        permissions::is_coach(&self.state.borrow())
    }

    pub fn is_parent(&self) -> bool {
        permissions::is_parent(&self.state.borrow())
    }

    pub fn has_multiple_contexts(&self) -> bool {
        permissions::has_multiple_contexts(&self.state.borrow())
    }

    pub fn children_contexts(&self) -> Vec<Context> {
        permissions::children_contexts(&self.state.borrow())
    }

    pub fn has_permission(&self, name: &str) -> bool {
        permissions::has_permission(&self.state.borrow(), name)
    }

    pub fn calendar_scope(&self) -> Option<CalendarScope> {
        permissions::calendar_scope(&self.state.borrow())
    }

    /// Club-wide flags; independent of the active context.
    pub fn account_flags(&self) -> AccountFlags {
        *self.flags.borrow()
    }

    pub fn is_admin(&self) -> bool {
        self.account_flags().is_admin
    }

    pub fn is_coordinator(&self) -> bool {
        self.account_flags().is_coordinator
    }

    // ─── Internals ───────────────────────────────────────────────

    async fn rebuild(&self, session: Option<Session>) {
        *self.session.write().await = session.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(session) = session else {
            tracing::debug!(generation, "No session, clearing contexts");
            self.commit(generation, |s| {
                *s = ContextState {
                    phase: LoadPhase::Ready,
                    ..ContextState::default()
                };
            });
            self.flags_resolved.store(false, Ordering::SeqCst);
            self.flags.send_replace(AccountFlags::default());
            return;
        };

        let user_changed = self
            .state
            .borrow()
            .user
            .as_ref()
            .map(|u| u.id.as_str())
            != Some(session.user_id());

        let started = self.commit(generation, |s| {
            if user_changed {
                *s = ContextState::default();
            }
            s.phase = LoadPhase::Loading;
            s.user = Some(session.user.clone());
            s.degraded = None;
        });
        if !started {
            return;
        }

        if user_changed {
            self.flags_resolved.store(false, Ordering::SeqCst);
        }
        let ceiling = self.options.init_timeout;

        // Both halves share the ceiling; neither may hold the other past it.
        let contexts = async {
            if tokio::time::timeout(ceiling, self.load(generation, &session))
                .await
                .is_err()
            {
                tracing::warn!(
                    user_id = session.user_id(),
                    generation,
                    timeout_ms = ceiling.as_millis() as u64,
                    "Context initialization timed out, showing partial state"
                );
                self.commit(generation, |s| {
                    s.phase = settled_phase(&s.contexts);
                    s.degraded = Some(Degradation::TimedOut);
                });
            }
        };
        let flags = async {
            if self.flags_resolved.load(Ordering::SeqCst) {
                return;
            }
            if tokio::time::timeout(ceiling, self.refresh_account_flags(&session))
                .await
                .is_err()
            {
                tracing::warn!(
                    user_id = session.user_id(),
                    "Account flag lookup timed out, flags stay false until the next load"
                );
            }
        };
        tokio::join!(contexts, flags);
    }

    /// Fetch contexts, select one, then fetch its group.
    async fn load(&self, generation: u64, session: &Session) {
        let epoch = self.selection_epoch.load(Ordering::SeqCst);
        let persisted = self.load_persisted_key(Some(session.user_id())).await;

        let (contexts, degraded) = match self.repository.fetch_contexts(session).await {
            Ok(contexts) => (contexts, None),
            Err(e) if e.is_permission_denied() => {
                (Vec::new(), Some(Degradation::SessionRejected(e.to_string())))
            }
            Err(e) => (Vec::new(), Some(Degradation::ContextsUnavailable(e.to_string()))),
        };
        let switched_meanwhile = self.selection_epoch.load(Ordering::SeqCst) != epoch;

        let mut selected: Option<Context> = None;
        let committed = self.commit(generation, |s| {
            // A switch made while this load was in flight beats the stored key.
            let kept = if switched_meanwhile {
                s.active_key()
                    .and_then(|key| contexts.iter().find(|c| c.identity_key() == key))
            } else {
                None
            };
            let chosen = kept
                .or_else(|| select_active_context(&contexts, persisted.as_deref()))
                .cloned();

            let same_group = match (&chosen, &s.active_context) {
                (Some(a), Some(b)) => a.group_id == b.group_id,
                _ => false,
            };
            if !same_group {
                s.active_group = None;
            }
            s.active_context = chosen.clone();
            s.contexts = contexts;
            s.degraded = degraded;
            selected = chosen;
        });
        if !committed {
            return;
        }

        let (group, failure) = match &selected {
            None => (None, None),
            Some(context) => match self.groups.fetch_group(session, &context.group_id).await {
                Ok(group) => (group, None),
                Err(e) => (None, Some(Degradation::GroupUnavailable(e.to_string()))),
            },
        };

        let selected_key = selected.as_ref().map(Context::identity_key);
        self.commit(generation, |s| {
            if s.active_key() == selected_key {
                s.active_group = group;
                if s.degraded.is_none() {
                    s.degraded = failure;
                }
            }
            s.phase = settled_phase(&s.contexts);
        });

        tracing::info!(
            user_id = session.user_id(),
            generation,
            contexts = self.state.borrow().contexts.len(),
            active = ?selected_key,
            "Contexts resolved"
        );
    }

    /// Apply `apply` only if `generation` is still the latest load.
    fn commit(&self, generation: u64, apply: impl FnOnce(&mut ContextState)) -> bool {
        let committed = self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            apply(s);
            true
        });

        if !committed {
            tracing::debug!(
                generation,
                latest = self.generation.load(Ordering::SeqCst),
                "Discarding stale context result"
            );
        }
        committed
    }

    /// Look up club-wide flags; they read `false` until the answer arrives.
    ///
    /// A lookup that errors still counts as resolved; one that is cut off
    /// by the ceiling does not, so the next load for this user retries it.
    async fn refresh_account_flags(&self, session: &Session) {
        self.flags.send_replace(AccountFlags::default());
        let flags = self
            .repository
            .fetch_account_flags(session)
            .await
            .unwrap_or_default();

        let still_signed_in = self
            .state
            .borrow()
            .user
            .as_ref()
            .is_some_and(|u| u.id == session.user.id);
        if still_signed_in {
            self.flags.send_replace(flags);
            self.flags_resolved.store(true, Ordering::SeqCst);
        }
    }

    async fn load_persisted_key(&self, user_id: Option<&str>) -> Option<String> {
        let slot = active_context_slot(user_id, self.options.per_user_key);
        match self.storage.load(&slot).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(slot = %slot, error = %e, "Failed to read persisted context key");
                None
            }
        }
    }

    async fn persist_key(&self, user_id: Option<&str>, key: &ContextKey) {
        let slot = active_context_slot(user_id, self.options.per_user_key);
        if let Err(e) = self.storage.save(&slot, key.as_str()).await {
            tracing::warn!(slot = %slot, error = %e, "Failed to persist context key");
        }
    }
}
