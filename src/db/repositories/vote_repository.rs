use crate::db::connection::DbPool;
use crate::db::models::{Network, Vote, VoteKind};
use sqlx::Error;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

pub struct NewVote<'a> {
    pub poll_id: Uuid,
    pub option_ids: &'a [Uuid],
    pub kind: VoteKind,
    pub voter: Option<&'a str>,
    pub tx_id: Option<&'a str>,
    pub verification_hash: Option<&'a str>,
    pub network: Network,
}

#[derive(Debug)]
pub struct VoteWithSelections {
    pub vote: Vote,
    pub options: Vec<String>,
}

/// Record a vote and bump the derived counters in a single transaction:
/// the vote row, one selection row per chosen option (rank preserves the
/// submission order for ranked polls), each option counter, and the poll
/// total. Either everything lands or nothing does.
///
/// A duplicate public vote trips the partial unique index on
/// (poll_id, voter) and surfaces as a database error the handler maps to
/// a conflict. An option id that does not belong to the poll leaves the
/// counter UPDATE matching zero rows and aborts with `RowNotFound`.
pub async fn cast_vote(pool: &DbPool, vote: NewVote<'_>) -> Result<Uuid, Error> {
    let vote_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO votes (id, poll_id, voter, kind, tx_id, verification_hash, network)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(vote_id)
    .bind(vote.poll_id)
    .bind(vote.voter)
    .bind(vote.kind.as_str())
    .bind(vote.tx_id)
    .bind(vote.verification_hash)
    .bind(vote.network.as_str())
    .execute(&mut *tx)
    .await?;

    for (rank, option_id) in vote.option_ids.iter().enumerate() {
        sqlx::query("INSERT INTO vote_selections (vote_id, option_id, rank) VALUES ($1, $2, $3)")
            .bind(vote_id)
            .bind(option_id)
            .bind(rank as i32)
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query(
            "UPDATE poll_options SET votes = votes + 1 WHERE id = $1 AND poll_id = $2",
        )
        .bind(option_id)
        .bind(vote.poll_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(Error::RowNotFound);
        }
    }

    sqlx::query(
        "UPDATE polls SET total_votes = total_votes + 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = $1",
    )
    .bind(vote.poll_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(vote_id)
}

pub async fn has_voted(pool: &DbPool, poll_id: Uuid, voter: &str) -> Result<bool, Error> {
    let row = sqlx::query("SELECT id FROM votes WHERE poll_id = $1 AND voter = $2")
        .bind(poll_id)
        .bind(voter)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

/// Vote records for a poll, newest first, each with the texts of the
/// options it selected in submission order.
pub async fn list_votes(pool: &DbPool, poll_id: Uuid) -> Result<Vec<VoteWithSelections>, Error> {
    let vote_rows = sqlx::query(
        "SELECT id, poll_id, voter, kind, tx_id, verification_hash, network, created_at
         FROM votes WHERE poll_id = $1 ORDER BY created_at DESC",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    let selection_rows = sqlx::query(
        r#"
        SELECT s.vote_id, o.option_text
        FROM vote_selections s
        JOIN poll_options o ON o.id = s.option_id
        WHERE o.poll_id = $1
        ORDER BY s.vote_id, s.rank
        "#,
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    let mut selections: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in selection_rows {
        let vote_id: Uuid = row.get("vote_id");
        let option_text: String = row.get("option_text");
        selections.entry(vote_id).or_default().push(option_text);
    }

    vote_rows
        .iter()
        .map(|row| {
            let vote = Vote::from_row(row)?;
            let options = selections.remove(&vote.id).unwrap_or_default();
            Ok(VoteWithSelections { vote, options })
        })
        .collect()
}
