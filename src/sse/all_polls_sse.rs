use crate::db::repositories::poll_repository::{self, PollFilter};
use crate::sse::models::{SseEvent, SseSender, status_event_name};
use crate::sse::snapshot::poll_snapshot;
use crate::startup::AppState;
use axum::{
    extract::Extension,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use std::{convert::Infallible, time::Duration};

/// Live stream for the poll list: an `init` dump of every poll, then
/// `poll_created` / `poll_updated` / `poll_ended` events as polls
/// appear, collect votes, or move state.
pub async fn all_polls_sse(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = sse_tx.subscribe();

    let stream = async_stream::stream! {
        match poll_repository::list_polls(&app_state.db, &PollFilter::default()).await {
            Ok(polls) => {
                let mut snapshots = Vec::with_capacity(polls.len());
                for poll in polls {
                    if let Ok(Some(snapshot)) = poll_snapshot(&app_state.db, poll.id).await {
                        snapshots.push(snapshot);
                    }
                }
                yield Ok(Event::default()
                    .event("init")
                    .data(json!({"polls": snapshots}).to_string()));
            }
            Err(_) => {
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Failed to load polls"}).to_string()));
                return;
            }
        }

        while let Ok(event) = rx.recv().await {
            match event {
                SseEvent::PollCreated { poll_id, title } => {
                    if let Ok(Some(snapshot)) = poll_snapshot(&app_state.db, poll_id).await {
                        yield Ok(Event::default()
                            .event("poll_created")
                            .data(json!({
                                "poll_id": poll_id,
                                "title": title,
                                "poll": snapshot,
                            }).to_string()));
                    }
                }
                SseEvent::VoteCast(cast) => {
                    if let Ok(Some(snapshot)) = poll_snapshot(&app_state.db, cast.poll_id).await {
                        yield Ok(Event::default()
                            .event("poll_updated")
                            .data(json!({
                                "poll_id": cast.poll_id,
                                "poll": snapshot,
                            }).to_string()));
                    }
                }
                SseEvent::StatusChanged { poll_id, status } => {
                    yield Ok(Event::default()
                        .event(status_event_name(status))
                        .data(json!({
                            "poll_id": poll_id,
                            "status": status,
                        }).to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
