use crate::db::connection::DbPool;
use crate::db::models::{Network, Poll, PollOption, PollStatus, PollType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Error;
use sqlx::Row;
use uuid::Uuid;

pub struct NewPoll<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub creator: &'a str,
    pub poll_type: PollType,
    pub max_selections: i32,
    pub status: PollStatus,
    pub network: Network,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Exact-match filters for the poll listing. Values are parsed into the
/// closed enums at the HTTP boundary, so lookups never miss on casing.
#[derive(Debug, Default)]
pub struct PollFilter<'a> {
    pub status: Option<PollStatus>,
    pub creator: Option<&'a str>,
    pub poll_type: Option<PollType>,
}

#[derive(Debug, Serialize)]
pub struct OptionRecount {
    pub option_id: Uuid,
    pub votes_before: i64,
    pub votes_after: i64,
}

#[derive(Debug, Serialize)]
pub struct RecountSummary {
    pub poll_id: Uuid,
    pub options: Vec<OptionRecount>,
    pub total_before: i64,
    pub total_after: i64,
}

/// Insert a poll and its options in one transaction, preserving the
/// submitted option order through the position column.
pub async fn create_poll(
    pool: &DbPool,
    poll: NewPoll<'_>,
    options: &[String],
) -> Result<Uuid, Error> {
    let poll_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO polls
            (id, title, description, creator, poll_type, max_selections,
             status, network, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(poll_id)
    .bind(poll.title)
    .bind(poll.description)
    .bind(poll.creator)
    .bind(poll.poll_type.as_str())
    .bind(poll.max_selections)
    .bind(poll.status.as_str())
    .bind(poll.network.as_str())
    .bind(poll.start_date)
    .bind(poll.end_date)
    .execute(&mut *tx)
    .await?;

    for (position, option_text) in options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO poll_options (id, poll_id, option_text, position) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(poll_id)
        .bind(option_text)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(poll_id)
}

pub async fn get_poll(pool: &DbPool, poll_id: Uuid) -> Result<Option<Poll>, Error> {
    let row = sqlx::query("SELECT * FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| Poll::from_row(&r)).transpose()
}

pub async fn list_polls(pool: &DbPool, filter: &PollFilter<'_>) -> Result<Vec<Poll>, Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM polls
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR creator = $2)
          AND ($3::text IS NULL OR poll_type = $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.creator)
    .bind(filter.poll_type.map(|t| t.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(Poll::from_row).collect()
}

pub async fn get_poll_options(pool: &DbPool, poll_id: Uuid) -> Result<Vec<PollOption>, Error> {
    let rows = sqlx::query(
        "SELECT id, poll_id, option_text, position, votes
         FROM poll_options WHERE poll_id = $1 ORDER BY position",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(PollOption::from_row).collect()
}

/// Move a poll from one of the expected states into `to`. Returns false
/// when the poll was not in any of the expected states (or is missing),
/// so callers can distinguish a lost race from success.
pub async fn set_status(
    pool: &DbPool,
    poll_id: Uuid,
    expected: &[PollStatus],
    to: PollStatus,
) -> Result<bool, Error> {
    let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();

    let result = sqlx::query(
        "UPDATE polls SET status = $1, updated_at = CURRENT_TIMESTAMP
         WHERE id = $2 AND status = ANY($3)",
    )
    .bind(to.as_str())
    .bind(poll_id)
    .bind(&expected)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flip polls whose time window has moved on: PENDING polls past their
/// start become ACTIVE, anything past its end becomes ENDED. Each UPDATE
/// is guarded by the current status so explicit cancel/end wins races.
pub async fn sweep_statuses(
    pool: &DbPool,
    now: DateTime<Utc>,
) -> Result<(Vec<Uuid>, Vec<Uuid>), Error> {
    let activated: Vec<Uuid> = sqlx::query(
        "UPDATE polls SET status = 'ACTIVE', updated_at = CURRENT_TIMESTAMP
         WHERE status = 'PENDING' AND start_date <= $1 AND end_date > $1
         RETURNING id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| r.get("id"))
    .collect();

    let ended: Vec<Uuid> = sqlx::query(
        "UPDATE polls SET status = 'ENDED', updated_at = CURRENT_TIMESTAMP
         WHERE status IN ('ACTIVE', 'PENDING') AND end_date <= $1
         RETURNING id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| r.get("id"))
    .collect();

    Ok((activated, ended))
}

/// Recompute option counters and the poll total from the stored vote
/// records. Counter updates are transactional at vote time, so this only
/// repairs drift introduced outside the API (manual edits, migrations).
pub async fn recount_votes(pool: &DbPool, poll_id: Uuid) -> Result<RecountSummary, Error> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"
        SELECT o.id, o.votes, COUNT(s.vote_id) AS actual
        FROM poll_options o
        LEFT JOIN vote_selections s ON s.option_id = o.id
        WHERE o.poll_id = $1
        GROUP BY o.id, o.votes
        ORDER BY o.id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut options = Vec::with_capacity(rows.len());
    for row in rows {
        let option_id: Uuid = row.get("id");
        let votes_before: i64 = row.get("votes");
        let votes_after: i64 = row.get("actual");

        if votes_before != votes_after {
            sqlx::query("UPDATE poll_options SET votes = $1 WHERE id = $2")
                .bind(votes_after)
                .bind(option_id)
                .execute(&mut *tx)
                .await?;
        }

        options.push(OptionRecount {
            option_id,
            votes_before,
            votes_after,
        });
    }

    let total_before: i64 = sqlx::query("SELECT total_votes FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_one(&mut *tx)
        .await?
        .get("total_votes");

    let total_after: i64 = sqlx::query("SELECT COUNT(*) AS total FROM votes WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_one(&mut *tx)
        .await?
        .get("total");

    if total_before != total_after {
        sqlx::query(
            "UPDATE polls SET total_votes = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(total_after)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(RecountSummary {
        poll_id,
        options,
        total_before,
        total_after,
    })
}
