use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::core::EngineEvent;

pub type EngineEventStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Build a Server-Sent Events stream of engine events.
///
/// Each event is named after its kind (`beep_started`, `motion_changed`, ...)
/// and carries the JSON-encoded event as data. Lagged receivers skip ahead.
pub fn engine_events(events: &broadcast::Sender<EngineEvent>) -> EngineEventStream {
    let stream = BroadcastStream::new(events.subscribe()).filter_map(|result| async move {
        let event = result.ok()?;
        let payload = serde_json::to_value(&event).ok()?;
        let name = payload["kind"]["type"]
            .as_str()
            .unwrap_or("engine")
            .to_string();
        Some(Ok(Event::default().event(name).data(payload.to_string())))
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("debug-keepalive"),
    )
}
