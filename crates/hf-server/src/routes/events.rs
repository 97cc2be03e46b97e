//! Server-Sent Events handler.
//!
//! Subscribes to the [`hf_core::events::EventBus`], optionally filters by
//! media ID, replays recent events for late joiners, and sends heartbeats.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use hf_core::MediaId;
use serde::Deserialize;

use crate::context::AppContext;

const REPLAY_EVENTS: usize = 50;
const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream events about this item.
    pub media_id: Option<MediaId>,
}

/// GET /events
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let filter = params.media_id;
    let wanted = move |event: &hf_core::events::Event| {
        filter.map_or(true, |id| event.payload.media_id() == id)
    };

    let recent = ctx.event_bus.recent_events(REPLAY_EVENTS);
    let mut rx = ctx.event_bus.subscribe();

    let stream = async_stream::stream! {
        for event in recent.into_iter().rev().filter(|e| wanted(e)) {
            if let Ok(data) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(data));
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT);

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) if wanted(&event) => {
                            if let Ok(data) = serde_json::to_string(&event) {
                                yield Ok(Event::default().data(data));
                            }
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}
