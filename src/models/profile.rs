//! Profile role and club-wide account flags.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Club-wide role on the user's own (`relation = self`) profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Admin,
    Coach,
    Athlete,
    Parent,
    /// Any role this service does not know about.
    #[serde(other)]
    Unknown,
}

/// The `{ role, is_coordinator }` columns of the self profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFlags {
    pub role: ProfileRole,
    #[serde(default)]
    pub is_coordinator: Option<bool>,
}

/// Account-wide administrative flags.
///
/// These come from the profile row, never from the active context, so
/// switching hats cannot add or strip them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AccountFlags {
    pub is_admin: bool,
    pub is_coordinator: bool,
}

impl AccountFlags {
    pub fn from_profile(profile: &ProfileFlags) -> Self {
        let is_admin = profile.role == ProfileRole::Admin;
        let is_coordinator = profile.is_coordinator == Some(true)
            || matches!(profile.role, ProfileRole::Admin | ProfileRole::Coach);
        Self {
            is_admin,
            is_coordinator,
        }
    }
}
