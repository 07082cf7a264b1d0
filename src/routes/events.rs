//! Server-sent events for context switches.
//!
//! GET /api/contexts/events
//!
//! Sends a `connected` event, then one `context_changed` event per switch
//! made through any of the user's tabs. Delivery is at-most-once: a client
//! that falls behind skips what it missed.

use crate::models::Session;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/contexts/events", get(context_events))
}

async fn context_events(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let store = state.sessions.store_for(&session).await;
    let subscription = store.subscribe();
    tracing::debug!(user_id = session.user_id(), "Context event stream opened");

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let changes = subscription.into_stream().filter_map(|change| async move {
        Event::default()
            .event("context_changed")
            .json_data(&change)
            .ok()
            .map(Ok)
    });

    Sse::new(connected.chain(changes)).keep_alive(KeepAlive::default())
}
