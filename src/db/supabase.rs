// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! REST client for the hosted data store (PostgREST dialect).
//!
//! Provides the three reads the context core depends on:
//! - `rpc/get_user_contexts` (context list)
//! - `groups` (group snapshot by id)
//! - `user_profiles` (club role and coordinator flag)

use crate::db::{tables, PortalDirectory};
use crate::error::FetchError;
use crate::models::{Context, GroupSnapshot, ProfileFlags, Session};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Data-store client.
#[derive(Clone)]
pub struct SupabaseDb {
    client: Option<RestClient>,
}

#[derive(Clone)]
struct RestClient {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
}

#[derive(Serialize)]
struct UserContextsParams<'a> {
    user_id: &'a str,
}

impl SupabaseDb {
    /// Create a new client for the project at `base_url`.
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let rest_url = format!("{}/rest/v1", base_url.trim_end_matches('/'));
        tracing::info!(url = %rest_url, "Data store client configured");

        Self {
            client: Some(RestClient {
                http: reqwest::Client::new(),
                rest_url,
                anon_key: anon_key.to_string(),
            }),
        }
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// All reads fail with [`FetchError::Offline`].
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&RestClient, FetchError> {
        self.client.as_ref().ok_or(FetchError::Offline)
    }
}

impl RestClient {
    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        session: &Session,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
    }

    /// Select at most one row from a table with `eq` filters.
    async fn select_one<T: DeserializeOwned>(
        &self,
        session: &Session,
        table: &str,
        columns: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<T>, FetchError> {
        let mut query: Vec<(String, String)> = filters
            .iter()
            .map(|(column, value)| (column.to_string(), eq_filter(value)))
            .collect();
        query.push(("select".to_string(), columns.to_string()));
        query.push(("limit".to_string(), "1".to_string()));

        let response = self
            .request(reqwest::Method::GET, table, session)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let rows: Vec<T> = check_response_json(response).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl PortalDirectory for SupabaseDb {
    async fn user_contexts(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Vec<Context>, FetchError> {
        let client = self.get_client()?;
        let response = client
            .request(
                reqwest::Method::POST,
                &format!("rpc/{}", tables::RPC_USER_CONTEXTS),
                session,
            )
            .json(&UserContextsParams { user_id })
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        // A procedure returning no rows may answer `null` instead of `[]`.
        let rows: Option<Vec<Context>> = check_response_json(response).await?;
        Ok(rows.unwrap_or_default())
    }

    async fn group(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Option<GroupSnapshot>, FetchError> {
        self.get_client()?
            .select_one(session, tables::GROUPS, "*", &[("id", group_id)])
            .await
    }

    async fn self_profile(
        &self,
        session: &Session,
        user_id: &str,
    ) -> Result<Option<ProfileFlags>, FetchError> {
        self.get_client()?
            .select_one(
                session,
                tables::USER_PROFILES,
                "role,is_coordinator",
                &[("user_id", user_id), ("relation", "self")],
            )
            .await
    }
}

/// PostgREST equality filter value, e.g. `eq.abc`.
///
/// Values are double-quoted so reserved characters (`,` `.` `(` `)`) are
/// taken literally. The query builder percent-encodes the result.
fn eq_filter(value: &str) -> String {
    format!("eq.\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            tracing::warn!(status = status.as_u16(), "Data store denied the request");
        }

        return Err(FetchError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&body),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Pull the `message` field out of a PostgREST error body, if there is one.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
