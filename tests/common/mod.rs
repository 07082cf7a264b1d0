// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use club_portal::config::Config;
use club_portal::db::MemoryDirectory;
use club_portal::middleware::auth::create_session_jwt;
use club_portal::models::{
    AuthUser, CalendarScope, Context, ContextType, GroupSnapshot, Relation, RoleDescriptor,
    RolePermissions, Session,
};
use club_portal::routes::create_router;
use club_portal::services::{ContextStore, MemoryKeyStorage, SessionRegistry, StoreOptions};
use club_portal::AppState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// User seeded with own, dependent and coach contexts.
#[allow(dead_code)]
pub const TEST_USER: &str = "user-1";

#[allow(dead_code)]
pub fn session(user_id: &str, token: &str) -> Session {
    Session::new(
        AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
        },
        token,
    )
}

#[allow(dead_code)]
pub fn role(name: &str, flags: &[(&str, bool)], scope: Option<CalendarScope>) -> RoleDescriptor {
    RoleDescriptor {
        role_name: name.to_string(),
        display_name: name.to_string(),
        permissions: RolePermissions {
            calendar_scope: scope,
            flags: flags
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::Bool(*v)))
                .collect::<BTreeMap<_, _>>(),
        },
    }
}

/// `self` participant in G1 via subscription S1.
#[allow(dead_code)]
pub fn own_context() -> Context {
    Context {
        context_type: ContextType::Participant,
        profile_id: "p-self".to_string(),
        profile_name: "Alex".to_string(),
        subscription_id: Some("S1".to_string()),
        group_id: "G1".to_string(),
        group_name: "Road A".to_string(),
        relation: Relation::Own,
        staff_role: None,
        roles: vec![role(
            "athlete",
            &[("can_view_calendar", true)],
            Some(CalendarScope::OwnGroups),
        )],
    }
}

/// Dependent in G2 via subscription S2, reached as parent.
#[allow(dead_code)]
pub fn dependent_context() -> Context {
    Context {
        context_type: ContextType::Dependent,
        profile_id: "p-kid".to_string(),
        profile_name: "Sam".to_string(),
        subscription_id: Some("S2".to_string()),
        group_id: "G2".to_string(),
        group_name: "Juniors".to_string(),
        relation: Relation::Parent,
        staff_role: None,
        roles: vec![role("athlete", &[("can_view_calendar", true)], None)],
    }
}

/// Head coach of G3; no subscription.
#[allow(dead_code)]
pub fn coach_context() -> Context {
    Context {
        context_type: ContextType::Coach,
        profile_id: "p-self".to_string(),
        profile_name: "Alex".to_string(),
        subscription_id: None,
        group_id: "G3".to_string(),
        group_name: "Race Team".to_string(),
        relation: Relation::Own,
        staff_role: Some("head_coach".to_string()),
        roles: vec![role(
            "head_coach",
            &[
                ("can_view_calendar", true),
                ("can_take_attendance", true),
                ("can_manage_groups", false),
            ],
            Some(CalendarScope::AssignedGroups),
        )],
    }
}

#[allow(dead_code)]
pub fn group(id: &str, name: &str) -> GroupSnapshot {
    GroupSnapshot {
        id: id.to_string(),
        name: name.to_string(),
        color_code: Some("#3366ff".to_string()),
        category: Some("road".to_string()),
        level_required: None,
        description: None,
        is_active: Some(true),
    }
}

/// Directory with groups G1..G3 and no users.
#[allow(dead_code)]
pub fn directory_with_groups() -> Arc<MemoryDirectory> {
    let directory = Arc::new(MemoryDirectory::new());
    directory.insert_group(group("G1", "Road A"));
    directory.insert_group(group("G2", "Juniors"));
    directory.insert_group(group("G3", "Race Team"));
    directory
}

/// A standalone store plus the fakes behind it.
#[allow(dead_code)]
pub struct StoreHarness {
    pub directory: Arc<MemoryDirectory>,
    pub storage: Arc<MemoryKeyStorage>,
    pub store: Arc<ContextStore>,
}

#[allow(dead_code)]
impl StoreHarness {
    pub fn new(options: StoreOptions) -> Self {
        Self::with_fakes(
            directory_with_groups(),
            Arc::new(MemoryKeyStorage::new()),
            options,
        )
    }

    pub fn with_fakes(
        directory: Arc<MemoryDirectory>,
        storage: Arc<MemoryKeyStorage>,
        options: StoreOptions,
    ) -> Self {
        let store = Arc::new(ContextStore::new(
            directory.clone(),
            storage.clone(),
            options,
        ));
        Self {
            directory,
            storage,
            store,
        }
    }

    /// A second store over the same fakes, as after a page reload.
    pub fn reload(&self, options: StoreOptions) -> Arc<ContextStore> {
        Arc::new(ContextStore::new(
            self.directory.clone(),
            self.storage.clone(),
            options,
        ))
    }
}

/// Bearer token for `user_id`, signed with the test config's secret.
#[allow(dead_code)]
pub fn bearer(user_id: &str) -> String {
    let token = create_session_jwt(
        user_id,
        Some("alex@example.com"),
        &Config::test_default().jwt_secret,
    )
    .expect("Failed to mint test token");
    format!("Bearer {}", token)
}

/// Create a test app over in-memory fakes.
/// `TEST_USER` has own, dependent and coach contexts and is a coach club-wide.
/// Returns the router, the shared state and the directory.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryDirectory>) {
    use club_portal::models::{ProfileFlags, ProfileRole};

    let config = Config::test_default();
    let directory = directory_with_groups();
    directory.set_contexts(
        TEST_USER,
        vec![own_context(), dependent_context(), coach_context()],
    );
    directory.set_profile(
        TEST_USER,
        ProfileFlags {
            role: ProfileRole::Coach,
            is_coordinator: Some(false),
        },
    );

    let sessions = SessionRegistry::from_config(
        &config,
        directory.clone(),
        Arc::new(MemoryKeyStorage::new()),
    );
    let state = Arc::new(AppState { config, sessions });

    (create_router(state.clone()), state, directory)
}
