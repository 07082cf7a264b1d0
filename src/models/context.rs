// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Context model: "acting as profile P, in group G, with roles R".
//!
//! Contexts are derived rows returned by the `get_user_contexts` procedure.
//! They are never persisted by this service; only the identity key of the
//! chosen context survives a reload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// How a context was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// An active subscription (enrollment) in a group.
    Participant,
    /// A group-staff assignment.
    Coach,
    /// A parent acting on behalf of a minor's participant context.
    Dependent,
}

/// How the signed-in user relates to the profile being acted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    #[serde(rename = "self")]
    Own,
    Parent,
    Guardian,
}

impl Relation {
    /// True for relations that let the user manage someone else's profile.
    pub fn is_guardianship(self) -> bool {
        matches!(self, Relation::Parent | Relation::Guardian)
    }
}

/// Which groups a role may see on the club calendar.
///
/// Variants are ordered from narrowest to broadest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum CalendarScope {
    OwnGroups,
    AssignedGroups,
    AllGroups,
}

/// Well-known permission names carried in role permission maps.
pub mod permission {
    pub const CAN_VIEW_CALENDAR: &str = "can_view_calendar";
    pub const CAN_TAKE_ATTENDANCE: &str = "can_take_attendance";
    pub const CAN_MANAGE_GROUPS: &str = "can_manage_groups";
    pub const CAN_MANAGE_EVENTS: &str = "can_manage_events";
    pub const CAN_POST_ANNOUNCEMENTS: &str = "can_post_announcements";
    pub const CAN_VIEW_ROSTER: &str = "can_view_roster";
}

/// Sparse permission map attached to a role.
///
/// A permission is granted only when its value is exactly `true`; missing
/// keys and non-boolean values both read as not granted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolePermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_scope: Option<CalendarScope>,
    #[serde(flatten)]
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl RolePermissions {
    /// Whether `name` is explicitly granted.
    pub fn grants(&self, name: &str) -> bool {
        matches!(self.flags.get(name), Some(serde_json::Value::Bool(true)))
    }

    /// Names of all explicitly granted permissions.
    pub fn granted(&self) -> impl Iterator<Item = &str> {
        self.flags
            .iter()
            .filter(|(_, v)| matches!(v, serde_json::Value::Bool(true)))
            .map(|(k, _)| k.as_str())
    }
}

/// A role held within a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoleDescriptor {
    pub role_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    #[cfg_attr(
        feature = "binding-generation",
        ts(type = "Record<string, unknown>")
    )]
    pub permissions: RolePermissions,
}

/// One hat the user can wear: a profile, scoped to exactly one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Context {
    pub context_type: ContextType,
    pub profile_id: String,
    pub profile_name: String,
    /// Present for participant and dependent contexts.
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub group_id: String,
    pub group_name: String,
    pub relation: Relation,
    /// Coaching role, for coach contexts.
    #[serde(default)]
    pub staff_role: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleDescriptor>,
}

impl Context {
    /// Key persisted to remember this context across reloads.
    ///
    /// The subscription id when there is one, otherwise `coach-{group_id}`.
    pub fn identity_key(&self) -> ContextKey {
        match self.subscription_id.as_deref() {
            Some(id) if !id.is_empty() => ContextKey(id.to_string()),
            _ => ContextKey(format!("coach-{}", self.group_id)),
        }
    }

    pub fn is_coach(&self) -> bool {
        self.context_type == ContextType::Coach
    }

    pub fn is_dependent(&self) -> bool {
        self.context_type == ContextType::Dependent
    }

    /// Contexts that belong to someone the user looks after.
    pub fn is_child(&self) -> bool {
        self.is_dependent() || self.relation.is_guardianship()
    }

    /// Whether any role in this context grants `name`.
    pub fn grants(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.permissions.grants(name))
    }
}

/// Identity key of a context, as persisted in client storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(transparent)]
pub struct ContextKey(pub String);

impl ContextKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ContextKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ContextKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
