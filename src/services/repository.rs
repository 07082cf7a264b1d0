// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Context repository and group detail fetcher.
//!
//! Thin glue over [`PortalDirectory`]: argument checks, timing and logging.
//! Failures are logged here and handed back as typed errors; deciding what
//! the user sees is left to the context store.

use crate::db::PortalDirectory;
use crate::error::FetchError;
use crate::models::{AccountFlags, Context, GroupSnapshot, Session};
use std::sync::Arc;
use std::time::Instant;

/// Fetches every context a user can act under, plus their account flags.
#[derive(Clone)]
pub struct ContextRepository {
    directory: Arc<dyn PortalDirectory>,
}

impl ContextRepository {
    pub fn new(directory: Arc<dyn PortalDirectory>) -> Self {
        Self { directory }
    }

    /// All contexts for the session's user, in the order the store returns them.
    pub async fn fetch_contexts(&self, session: &Session) -> Result<Vec<Context>, FetchError> {
        let user_id = session.user_id();
        if user_id.is_empty() {
            return Err(FetchError::InvalidArgument("user id must not be empty"));
        }

        let started = Instant::now();
        match self.directory.user_contexts(session, user_id).await {
            Ok(contexts) => {
                tracing::debug!(
                    user_id,
                    count = contexts.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fetched contexts"
                );
                Ok(contexts)
            }
            Err(e) if e.is_permission_denied() => {
                tracing::warn!(user_id, error = %e, "Data store rejected the session for contexts");
                Err(e)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to fetch contexts");
                Err(e)
            }
        }
    }

    /// Club-wide flags from the user's own profile row.
    ///
    /// A missing row yields the default (all `false`) flags.
    pub async fn fetch_account_flags(&self, session: &Session) -> Result<AccountFlags, FetchError> {
        let user_id = session.user_id();
        if user_id.is_empty() {
            return Err(FetchError::InvalidArgument("user id must not be empty"));
        }

        match self.directory.self_profile(session, user_id).await {
            Ok(Some(profile)) => Ok(AccountFlags::from_profile(&profile)),
            Ok(None) => {
                tracing::debug!(user_id, "No self profile row, account flags default to false");
                Ok(AccountFlags::default())
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to look up account flags");
                Err(e)
            }
        }
    }
}

/// Fetches group details by id. No caching of its own.
#[derive(Clone)]
pub struct GroupFetcher {
    directory: Arc<dyn PortalDirectory>,
}

impl GroupFetcher {
    pub fn new(directory: Arc<dyn PortalDirectory>) -> Self {
        Self { directory }
    }

    pub async fn fetch_group(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Option<GroupSnapshot>, FetchError> {
        if group_id.is_empty() {
            return Err(FetchError::InvalidArgument("group id must not be empty"));
        }

        let result = self.directory.group(session, group_id).await;
        match &result {
            Ok(None) => tracing::debug!(group_id, "Group not found"),
            Err(e) => tracing::warn!(group_id, error = %e, "Failed to fetch group"),
            Ok(Some(_)) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::DirectoryRead;
    use crate::db::MemoryDirectory;
    use crate::models::{AuthUser, ProfileFlags, ProfileRole};

    fn session(user_id: &str) -> Session {
        Session::new(
            AuthUser {
                id: user_id.to_string(),
                email: None,
            },
            "token-1",
        )
    }

    #[tokio::test]
    async fn test_empty_user_id_is_rejected_without_a_call() {
        let directory = Arc::new(MemoryDirectory::new());
        let repo = ContextRepository::new(directory.clone());

        let err = repo.fetch_contexts(&session("")).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidArgument(_)));
        assert_eq!(directory.call_count(DirectoryRead::UserContexts), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_contexts() {
        let repo = ContextRepository::new(Arc::new(MemoryDirectory::new()));
        let contexts = repo.fetch_contexts(&session("nobody")).await.unwrap();
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_profile_gives_default_flags() {
        let directory = Arc::new(MemoryDirectory::new());
        let repo = ContextRepository::new(directory.clone());

        let flags = repo.fetch_account_flags(&session("u1")).await.unwrap();
        assert_eq!(flags, AccountFlags::default());

        directory.set_profile(
            "u1",
            ProfileFlags {
                role: ProfileRole::Admin,
                is_coordinator: None,
            },
        );
        let flags = repo.fetch_account_flags(&session("u1")).await.unwrap();
        assert!(flags.is_admin);
    }

    #[tokio::test]
    async fn test_group_fetch_passes_errors_through() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.fail(
            DirectoryRead::Group,
            FetchError::Transport("connection reset".to_string()),
        );
        let groups = GroupFetcher::new(directory);

        let err = groups.fetch_group(&session("u1"), "G1").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
