//! Server-sent events carrying the change feed to the browser.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use ledgerdeck_core::StateEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::main_lib::AppState;

fn to_sse(event: &StateEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(err) => {
            warn!("Dropping unserializable {} event: {}", event.name(), err);
            None
        }
    }
}

/// Adapts a feed subscription into an SSE stream. A lagging client skips what it
/// missed and keeps receiving; snapshots stay available for resync.
fn feed_stream(
    rx: broadcast::Receiver<StateEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(sse) = to_sse(&event) {
                        return Some((Ok(sse), rx));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream client lagged; skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(feed_stream(state.coordinator.subscribe()))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(stream_events))
}
