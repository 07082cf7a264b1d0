// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Context and permission endpoints, end to end through the router.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use club_portal::db::memory::DirectoryRead;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{create_test_app, TEST_USER};

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, common::bearer(TEST_USER));
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_get_contexts_resolves_self_context() {
    let (app, _, _) = create_test_app();

    let (status, body) = call(&app, "GET", "/api/contexts", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "ready");
    assert_eq!(body["contexts"].as_array().unwrap().len(), 3);
    assert_eq!(body["active_context_key"], "S1");
    assert_eq!(body["active_context"]["relation"], "self");
    assert_eq!(body["active_group"]["name"], "Road A");
    assert_eq!(body["has_multiple_contexts"], true);
    assert_eq!(body["is_parent"], true);
    assert_eq!(body["is_coach"], false);
    assert_eq!(body["account_flags"]["is_admin"], false);
    assert_eq!(body["account_flags"]["is_coordinator"], true);
    assert!(body["degraded"].is_null());
}

#[tokio::test]
async fn test_store_is_reused_across_requests() {
    let (app, _, directory) = create_test_app();

    call(&app, "GET", "/api/contexts", None).await;
    call(&app, "GET", "/api/permissions", None).await;
    call(&app, "GET", "/api/contexts/children", None).await;

    assert_eq!(directory.call_count(DirectoryRead::UserContexts), 1);
}

#[tokio::test]
async fn test_switch_context() {
    let (app, _, _) = create_test_app();

    let (status, body) = call(
        &app,
        "PUT",
        "/api/contexts/active",
        Some(json!({"context_key": "coach-G3"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_context_key"], "coach-G3");
    assert_eq!(body["active_group"]["id"], "G3");
    assert_eq!(body["is_coach"], true);
    assert_eq!(body["calendar_scope"], "assigned_groups");

    // Account-wide flags unaffected by the switch
    assert_eq!(body["account_flags"]["is_coordinator"], true);
    assert_eq!(body["account_flags"]["is_admin"], false);

    let (_, body) = call(&app, "GET", "/api/contexts", None).await;
    assert_eq!(body["active_context_key"], "coach-G3");
}

#[tokio::test]
async fn test_switch_to_unknown_context_is_404() {
    let (app, _, _) = create_test_app();

    let (status, body) = call(
        &app,
        "PUT",
        "/api/contexts/active",
        Some(json!({"context_key": "S404"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, body) = call(&app, "GET", "/api/contexts", None).await;
    assert_eq!(body["active_context_key"], "S1");
}

#[tokio::test]
async fn test_switch_with_empty_key_is_400() {
    let (app, _, _) = create_test_app();

    let (status, body) = call(
        &app,
        "PUT",
        "/api/contexts/active",
        Some(json!({"context_key": ""})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_refetch_picks_up_new_membership() {
    let (app, _, directory) = create_test_app();
    call(&app, "GET", "/api/contexts", None).await;

    let mut second_group = common::own_context();
    second_group.subscription_id = Some("S7".to_string());
    second_group.group_id = "G2".to_string();
    directory.set_contexts(
        TEST_USER,
        vec![
            common::own_context(),
            common::dependent_context(),
            common::coach_context(),
            second_group,
        ],
    );

    let (status, body) = call(&app, "POST", "/api/contexts/refetch", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contexts"].as_array().unwrap().len(), 4);
    assert_eq!(body["active_context_key"], "S1");
}

#[tokio::test]
async fn test_context_outage_degrades_to_empty() {
    let (app, _, directory) = create_test_app();
    directory.fail(
        DirectoryRead::UserContexts,
        club_portal::error::FetchError::Transport("connection refused".to_string()),
    );

    let (status, body) = call(&app, "GET", "/api/contexts", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "empty");
    assert!(body["contexts"].as_array().unwrap().is_empty());
    assert!(body["active_context"].is_null());
    assert_eq!(body["degraded"]["kind"], "contexts_unavailable");
}

#[tokio::test]
async fn test_children() {
    let (app, _, _) = create_test_app();

    let (status, body) = call(&app, "GET", "/api/contexts/children", None).await;

    assert_eq!(status, StatusCode::OK);
    let children = body.as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["group_id"], "G2");
    assert_eq!(children[0]["context_type"], "dependent");
}

#[tokio::test]
async fn test_permissions_follow_active_context() {
    let (app, _, _) = create_test_app();

    let (_, body) = call(&app, "GET", "/api/permissions", None).await;
    assert_eq!(body["context_key"], "S1");
    assert_eq!(body["granted"], json!(["can_view_calendar"]));
    assert_eq!(body["calendar_scope"], "own_groups");

    let (_, body) = call(&app, "GET", "/api/permissions/can_take_attendance", None).await;
    assert_eq!(body["permission"], "can_take_attendance");
    assert_eq!(body["granted"], false);

    call(
        &app,
        "PUT",
        "/api/contexts/active",
        Some(json!({"context_key": "coach-G3"})),
    )
    .await;

    let (_, body) = call(&app, "GET", "/api/permissions/can_take_attendance", None).await;
    assert_eq!(body["granted"], true);

    // Present but false is still false
    let (_, body) = call(&app, "GET", "/api/permissions/can_manage_groups", None).await;
    assert_eq!(body["granted"], false);
}

#[tokio::test]
async fn test_sign_out_drops_store() {
    let (app, state, _) = create_test_app();
    call(&app, "GET", "/api/contexts", None).await;
    assert_eq!(state.sessions.active_sessions(), 1);

    let (status, body) = call(&app, "POST", "/api/session/sign-out", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(state.sessions.active_sessions(), 0);
}

#[tokio::test]
async fn test_event_stream_headers() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/contexts/events")
                .header(header::AUTHORIZATION, common::bearer(TEST_USER))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
}
