use crate::sse::models::{SseEvent, SseSender, status_event_name};
use crate::sse::snapshot::poll_snapshot;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use std::{convert::Infallible, time::Duration};
use uuid::Uuid;

/// Live stream for one poll: an `init` snapshot, then a `vote_update`
/// per recorded vote, a `poll_updated` when the poll opens and a
/// `poll_ended` when it ends or is cancelled.
pub async fn poll_updates_sse(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
    Path(poll_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = sse_tx.subscribe();

    let stream = async_stream::stream! {
        match poll_snapshot(&app_state.db, poll_id).await {
            Ok(Some(snapshot)) => {
                yield Ok(Event::default().event("init").data(snapshot.to_string()));
            }
            Ok(None) => {
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Poll not found"}).to_string()));
                return;
            }
            Err(_) => {
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Database error"}).to_string()));
                return;
            }
        }

        while let Ok(event) = rx.recv().await {
            match event {
                SseEvent::VoteCast(cast) if cast.poll_id == poll_id => {
                    match poll_snapshot(&app_state.db, poll_id).await {
                        Ok(Some(snapshot)) => {
                            yield Ok(Event::default()
                                .event("vote_update")
                                .data(snapshot.to_string()));
                        }
                        _ => {
                            // Skip the update, the next vote will refresh.
                        }
                    }
                }
                SseEvent::StatusChanged { poll_id: changed_id, status } if changed_id == poll_id => {
                    yield Ok(Event::default()
                        .event(status_event_name(status))
                        .data(json!({
                            "poll_id": poll_id,
                            "status": status,
                        }).to_string()));
                }
                _ => {}
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
