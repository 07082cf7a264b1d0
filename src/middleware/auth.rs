// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication middleware.
//!
//! The identity provider signs access tokens with HS256. The browser sends
//! the token either in the `sb-access-token` cookie or as a Bearer header;
//! the verified token is forwarded unchanged to the data store so its
//! row-level security sees the same user.

use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie the frontend stores the access token in.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Audience the identity provider puts on user tokens.
pub const SESSION_AUDIENCE: &str = "authenticated";

/// Access token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: usize,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Verify an access token and turn it into a [`Session`].
pub fn verify_session_token(token: &str, secret: &[u8]) -> Option<Session> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[SESSION_AUDIENCE]);

    let token_data = decode::<Claims>(token, &key, &validation).ok()?;
    if token_data.claims.sub.is_empty() {
        return None;
    }

    let user = AuthUser {
        id: token_data.claims.sub,
        email: token_data.claims.email,
    };
    Some(Session::new(user, token))
}

/// Middleware that requires a valid session token.
///
/// No token at all is `Unauthorized`; a token that fails verification is
/// `InvalidToken`. Both answer 401.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => bearer_token(&request).ok_or(AppError::Unauthorized)?,
    };

    let session = verify_session_token(&token, &state.config.jwt_secret).ok_or_else(|| {
        tracing::debug!("Rejected session token");
        AppError::InvalidToken
    })?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Mint an access token the way the identity provider does. Used by tests
/// and local development.
pub fn create_session_jwt(
    user_id: &str,
    email: Option<&str>,
    secret: &[u8],
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 60 * 60, // 1 hour, like the provider's default
        email: email.map(String::from),
        aud: SESSION_AUDIENCE.to_string(),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}
