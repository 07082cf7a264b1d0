//! In-process directory for tests and local development.
//!
//! Seeded per user with contexts and profile rows, plus a group table.
//! Each read can be made to fail or to stall, so ordering, timeout and
//! degradation behavior can be exercised without a network.

use crate::db::PortalDirectory;
use crate::error::FetchError;
use crate::models::{Context, GroupSnapshot, ProfileFlags, Session};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// The reads a [`MemoryDirectory`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryRead {
    UserContexts,
    Group,
    SelfProfile,
}

/// Seeded in-memory implementation of [`PortalDirectory`].
#[derive(Default)]
pub struct MemoryDirectory {
    contexts: DashMap<String, Vec<Context>>,
    groups: DashMap<String, GroupSnapshot>,
    profiles: DashMap<String, ProfileFlags>,
    failures: DashMap<DirectoryRead, FetchError>,
    delays: DashMap<DirectoryRead, Duration>,
    calls: DashMap<DirectoryRead, AtomicUsize>,
    last_token: Mutex<Option<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the context list returned for `user_id`.
    pub fn set_contexts(&self, user_id: &str, contexts: Vec<Context>) {
        self.contexts.insert(user_id.to_string(), contexts);
    }

    pub fn insert_group(&self, group: GroupSnapshot) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn remove_group(&self, group_id: &str) {
        self.groups.remove(group_id);
    }

    pub fn set_profile(&self, user_id: &str, profile: ProfileFlags) {
        self.profiles.insert(user_id.to_string(), profile);
    }

    /// Make every subsequent `read` fail with `error`.
    pub fn fail(&self, read: DirectoryRead, error: FetchError) {
        self.failures.insert(read, error);
    }

    pub fn recover(&self, read: DirectoryRead) {
        self.failures.remove(&read);
    }

    /// Stall every subsequent `read` by `delay` before answering.
    ///
    /// The answer is computed when the call starts, so a stalled call
    /// returns the data as it was at that moment.
    pub fn delay(&self, read: DirectoryRead, delay: Duration) {
        if delay.is_zero() {
            self.delays.remove(&read);
        } else {
            self.delays.insert(read, delay);
        }
    }

    /// Number of times `read` has been served.
    pub fn call_count(&self, read: DirectoryRead) -> usize {
        self.calls
            .get(&read)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Access token presented by the most recent read.
    pub fn last_access_token(&self) -> Option<String> {
        self.last_token
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    async fn serve<T>(
        &self,
        read: DirectoryRead,
        session: &Session,
        answer: impl FnOnce() -> T,
    ) -> Result<T, FetchError> {
        self.calls
            .entry(read)
            .or_default()
            .fetch_add(1, Ordering::SeqCst);
        if let Ok(mut token) = self.last_token.lock() {
            *token = Some(session.access_token.clone());
        }

        let failure = self.failures.get(&read).map(|e| e.clone());
        let delay = self.delays.get(&read).map(|d| *d);
        let result = match failure {
            Some(error) => Err(error),
            None => Ok(answer()),
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl PortalDirectory for MemoryDirectory {
    async fn user_contexts(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Vec<Context>, FetchError> {
        self.serve(DirectoryRead::UserContexts, session, || {
            self.contexts
                .get(user_id)
                .map(|c| c.clone())
                .unwrap_or_default()
        })
        .await
    }

    async fn group(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Option<GroupSnapshot>, FetchError> {
        self.serve(DirectoryRead::Group, session, || {
            self.groups.get(group_id).map(|g| g.clone())
        })
        .await
    }

    async fn self_profile(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Option<ProfileFlags>, FetchError> {
        self.serve(DirectoryRead::SelfProfile, session, || {
            self.profiles.get(user_id).map(|p| p.clone())
        })
        .await
    }
}
