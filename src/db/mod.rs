//! Database layer (hosted relational store over REST).

pub mod memory;
pub mod supabase;

pub use memory::MemoryDirectory;
pub use supabase::SupabaseDb;

use crate::error::FetchError;
use crate::models::{Context, GroupSnapshot, ProfileFlags, Session};
use async_trait::async_trait;

/// Table, view and procedure names as constants.
pub mod tables {
    pub const GROUPS: &str = "groups";
    /// One row per (user, profile) link, carrying the relation and club role
    pub const USER_PROFILES: &str = "user_profiles";
    /// Read-only procedure returning every context a user can act under
    pub const RPC_USER_CONTEXTS: &str = "get_user_contexts";
}

/// The reads this service needs from the data store.
///
/// Every read runs under the caller's session so the store's row-level
/// security applies. Not-found is `Ok(None)` / `Ok(vec![])`.
#[async_trait]
pub trait PortalDirectory: Send + Sync {
    /// Union of the user's own subscriptions, their dependents'
    /// subscriptions and their group-staff assignments, computed server-side.
    async fn user_contexts(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Vec<Context>, FetchError>;

    /// Single group by primary key.
    async fn group(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Option<GroupSnapshot>, FetchError>;

    /// The `relation = self` profile row of a user.
    async fn self_profile(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Option<ProfileFlags>, FetchError>;
}
