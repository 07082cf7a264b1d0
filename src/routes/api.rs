// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.
//!
//! Every handler works on the caller's own [`ContextStore`], looked up (or
//! created) from the verified session.
//!
//! [`ContextStore`]: crate::services::ContextStore

use crate::error::{AppError, Result};
use crate::models::{AccountFlags, AuthUser, CalendarScope, Context, ContextKey, GroupSnapshot, Session};
use crate::services::{ContextStore, Degradation, LoadPhase};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require a session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/contexts", get(get_contexts))
        .route("/api/contexts/active", put(switch_context))
        .route("/api/contexts/refetch", post(refetch_contexts))
        .route("/api/contexts/children", get(get_children))
        .route("/api/permissions", get(get_permissions))
        .route("/api/permissions/{name}", get(check_permission))
        .route("/api/session/sign-out", post(sign_out))
}

// ─── Contexts ────────────────────────────────────────────────

/// Everything the frontend needs to render the current hat.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ContextsResponse {
    pub phase: LoadPhase,
    pub user: Option<AuthUser>,
    pub contexts: Vec<Context>,
    pub active_context: Option<Context>,
    pub active_context_key: Option<ContextKey>,
    pub active_group: Option<GroupSnapshot>,
    pub degraded: Option<Degradation>,
    pub account_flags: AccountFlags,
    pub is_coach: bool,
    pub is_parent: bool,
    pub has_multiple_contexts: bool,
    pub calendar_scope: Option<CalendarScope>,
}

impl ContextsResponse {
    fn from_store(store: &ContextStore) -> Self {
        let state = store.snapshot();
        Self {
            is_coach: store.is_coach(),
            is_parent: store.is_parent(),
            has_multiple_contexts: store.has_multiple_contexts(),
            calendar_scope: store.calendar_scope(),
            account_flags: store.account_flags(),
            active_context_key: state.active_key(),
            phase: state.phase,
            user: state.user,
            contexts: state.contexts,
            active_context: state.active_context,
            active_group: state.active_group,
            degraded: state.degraded,
        }
    }
}

/// Current contexts, active context and its group.
async fn get_contexts(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<ContextsResponse> {
    let store = state.sessions.store_for(&session).await;
    Json(ContextsResponse::from_store(&store))
}

#[derive(Debug, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SwitchContextRequest {
    #[validate(length(min = 1, max = 128))]
    pub context_key: String,
}

/// Switch the active context by identity key.
async fn switch_context(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(request): Json<SwitchContextRequest>,
) -> Result<Json<ContextsResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid context_key: {}", e)))?;

    let store = state.sessions.store_for(&session).await;
    store
        .set_active_context_by_key(&request.context_key)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Context {}", request.context_key)))?;

    Ok(Json(ContextsResponse::from_store(&store)))
}

/// Rebuild contexts from the data store.
async fn refetch_contexts(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<ContextsResponse> {
    let store = state.sessions.store_for(&session).await;
    store.refetch().await;
    Json(ContextsResponse::from_store(&store))
}

/// Contexts belonging to the user's dependents.
async fn get_children(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<Vec<Context>> {
    let store = state.sessions.store_for(&session).await;
    Json(store.children_contexts())
}

// ─── Permissions ─────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PermissionsResponse {
    /// Context the permissions were resolved for
    pub context_key: Option<ContextKey>,
    pub granted: Vec<String>,
    pub calendar_scope: Option<CalendarScope>,
    pub is_coach: bool,
    pub is_parent: bool,
    pub is_admin: bool,
    pub is_coordinator: bool,
    pub has_multiple_contexts: bool,
}

async fn get_permissions(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<PermissionsResponse> {
    let store = state.sessions.store_for(&session).await;
    let snapshot = store.snapshot();

    Json(PermissionsResponse {
        context_key: snapshot.active_key(),
        granted: crate::services::permissions::granted_permissions(&snapshot)
            .into_iter()
            .collect(),
        calendar_scope: crate::services::permissions::calendar_scope(&snapshot),
        is_coach: store.is_coach(),
        is_parent: store.is_parent(),
        is_admin: store.is_admin(),
        is_coordinator: store.is_coordinator(),
        has_multiple_contexts: store.has_multiple_contexts(),
    })
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PermissionCheckResponse {
    pub permission: String,
    pub granted: bool,
}

/// Check one permission against the active context.
async fn check_permission(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(name): Path<String>,
) -> Json<PermissionCheckResponse> {
    let store = state.sessions.store_for(&session).await;
    let granted = store.has_permission(&name);
    Json(PermissionCheckResponse {
        permission: name,
        granted,
    })
}

// ─── Session ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignOutResponse {
    pub success: bool,
}

/// Drop the user's context state. The persisted context key is kept so the
/// next sign-in lands on the same hat.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<SignOutResponse> {
    let had_store = state.sessions.sign_out(session.user_id()).await;
    tracing::info!(user_id = session.user_id(), had_store, "User signed out");
    Json(SignOutResponse { success: true })
}
