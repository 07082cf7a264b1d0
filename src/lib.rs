// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Club portal: multi-role context resolution for a sports-club portal.
//!
//! A signed-in user may act as a participant, as a parent or guardian of a
//! dependent, or as a coach of a group. This crate resolves those contexts
//! from the hosted data store, tracks which one is active, and answers
//! role and permission questions against it. The server binary exposes the
//! same state to the browser over a small JSON + SSE API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::SessionRegistry;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
}
