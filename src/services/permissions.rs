//! Role and permission resolution over the context store's state.
//!
//! Everything here answers "what can I do as the currently selected hat".
//! Club-wide flags (`is_admin`, `is_coordinator`) are [`AccountFlags`] and
//! are resolved separately from the user's profile row.
//!
//! [`AccountFlags`]: crate::models::AccountFlags

use crate::models::{CalendarScope, Context};
use crate::services::context_store::ContextState;
use std::collections::BTreeSet;

pub fn is_coach(state: &ContextState) -> bool {
    state.active_context.as_ref().is_some_and(Context::is_coach)
}

/// Acting for a dependent now, or able to switch to someone the user looks after.
pub fn is_parent(state: &ContextState) -> bool {
    let acting_for_dependent = state
        .active_context
        .as_ref()
        .is_some_and(Context::is_dependent);

    acting_for_dependent || state.contexts.iter().any(|c| c.relation.is_guardianship())
}

pub fn has_multiple_contexts(state: &ContextState) -> bool {
    state.contexts.len() > 1
}

/// Contexts belonging to dependents, in list order.
pub fn children_contexts(state: &ContextState) -> Vec<Context> {
    state
        .contexts
        .iter()
        .filter(|c| c.is_child())
        .cloned()
        .collect()
}

/// Whether any role of the active context grants `name`.
///
/// `false` when no context is active.
pub fn has_permission(state: &ContextState, name: &str) -> bool {
    state
        .active_context
        .as_ref()
        .is_some_and(|c| c.grants(name))
}

/// Every permission granted by the active context's roles.
pub fn granted_permissions(state: &ContextState) -> BTreeSet<String> {
    state
        .active_context
        .iter()
        .flat_map(|c| c.roles.iter())
        .flat_map(|r| r.permissions.granted())
        .map(String::from)
        .collect()
}

/// Broadest calendar scope among the active context's roles.
pub fn calendar_scope(state: &ContextState) -> Option<CalendarScope> {
    state
        .active_context
        .iter()
        .flat_map(|c| c.roles.iter())
        .filter_map(|r| r.permissions.calendar_scope)
        .max()
}
