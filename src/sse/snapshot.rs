use crate::db::connection::DbPool;
use crate::db::repositories::poll_repository;
use crate::results;
use serde_json::{Value, json};
use uuid::Uuid;

/// Current state of one poll as pushed to SSE clients: the poll row, its
/// options in ballot order, and the sorted tally.
pub async fn poll_snapshot(db: &DbPool, poll_id: Uuid) -> Result<Option<Value>, sqlx::Error> {
    let Some(poll) = poll_repository::get_poll(db, poll_id).await? else {
        return Ok(None);
    };
    let options = poll_repository::get_poll_options(db, poll_id).await?;
    let total_votes = poll.total_votes;
    let tallies = results::tally(&options, total_votes);

    Ok(Some(json!({
        "poll": poll,
        "options": options,
        "results": tallies,
        "total_votes": total_votes,
    })))
}
