// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Club Portal API Server
//!
//! Resolves each signed-in user's contexts (own, dependents', coaching)
//! and serves the active context and its permissions to the frontend.

use club_portal::{
    config::Config,
    db::SupabaseDb,
    services::{FileKeyStorage, SessionRegistry},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Club Portal API");

    // Data store client
    let db = SupabaseDb::new(&config.supabase_url, &config.supabase_anon_key);
    tracing::info!(url = %config.supabase_url, "Data store client initialized");

    // Persisted active-context keys
    let storage = FileKeyStorage::new(&config.context_key_file);
    tracing::info!(path = %storage.path().display(), "Context key storage ready");

    let sessions = SessionRegistry::from_config(&config, Arc::new(db), Arc::new(storage));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        sessions,
    });

    // Drop context stores of users who have gone quiet
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.sessions.evict_idle().await;
        }
    });

    // Build router
    let app = club_portal::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("club_portal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
