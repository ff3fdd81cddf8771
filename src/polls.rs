use crate::db::models::{Network, Poll, PollOption, PollStatus, PollType, VoteKind};
use crate::db::repositories::{poll_repository, vote_repository};
use crate::db::repositories::{NewPoll, NewVote, PollFilter};
use crate::error::ApiError;
use crate::results;
use crate::sse::{SseEvent, SseSender, VoteCast};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: String,
    pub creator: String,
    pub options: Vec<String>,
    #[serde(rename = "type")]
    pub poll_type: PollType,
    pub max_selections: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub network: Option<Network>,
}

#[derive(Debug, Deserialize)]
pub struct ListPollsQuery {
    pub status: Option<String>,
    pub creator: Option<String>,
    #[serde(rename = "type")]
    pub poll_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PollOptionResponse {
    pub id: Uuid,
    pub text: String,
    pub position: i32,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub creator: String,
    #[serde(rename = "type")]
    pub poll_type: PollType,
    pub max_selections: i32,
    pub status: PollStatus,
    pub network: Network,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_votes: i64,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOptionResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub option_ids: Vec<Uuid>,
    pub kind: VoteKind,
    pub voter: Option<String>,
    pub tx_id: Option<String>,
    pub verification_hash: Option<String>,
    pub network: Option<Network>,
}

#[derive(Debug, Serialize)]
pub struct CastVoteResponse {
    pub vote_id: Uuid,
    pub total_votes: i64,
    pub options: Vec<PollOptionResponse>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub id: Uuid,
    pub voter: Option<String>,
    pub kind: VoteKind,
    pub options: Vec<String>,
    pub tx_id: Option<String>,
    pub verification_hash: Option<String>,
    pub network: Network,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub poll_id: Uuid,
    pub status: PollStatus,
    pub total_votes: i64,
    pub results: Vec<results::OptionTally>,
    pub leader: Option<Uuid>,
}

/// Creator-gated operations carry the wallet address in the body; there
/// is no session layer, the address stands in for identity.
#[derive(Debug, Deserialize)]
pub struct CreatorRequest {
    pub creator: String,
}

fn poll_response(poll: Poll, options: Vec<PollOption>) -> PollResponse {
    PollResponse {
        id: poll.id,
        title: poll.title,
        description: poll.description,
        creator: poll.creator,
        poll_type: poll.poll_type,
        max_selections: poll.max_selections,
        status: poll.status,
        network: poll.network,
        start_date: poll.start_date,
        end_date: poll.end_date,
        total_votes: poll.total_votes,
        created_at: poll.created_at,
        options: options
            .into_iter()
            .map(|opt| PollOptionResponse {
                id: opt.id,
                text: opt.option_text,
                position: opt.position,
                votes: opt.votes,
            })
            .collect(),
    }
}

/// Validate a creation request, returning the effective max_selections.
fn validate_create(req: &CreatePollRequest) -> Result<i32, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::InvalidRequest("title is required".into()));
    }
    if req.creator.trim().is_empty() {
        return Err(ApiError::InvalidRequest("creator is required".into()));
    }
    if req.options.len() < 2 {
        return Err(ApiError::InvalidRequest(
            "at least 2 options are required".into(),
        ));
    }
    if req.options.iter().any(|o| o.trim().is_empty()) {
        return Err(ApiError::InvalidRequest("options must not be empty".into()));
    }
    if req.end_date <= req.start_date {
        return Err(ApiError::InvalidRequest(
            "end date must be after start date".into(),
        ));
    }

    let option_count = req.options.len() as i32;
    let max_selections = req.max_selections.unwrap_or(match req.poll_type {
        PollType::RankedChoice => option_count,
        _ => 1,
    });

    if max_selections < 1 {
        return Err(ApiError::InvalidRequest(
            "max_selections must be at least 1".into(),
        ));
    }
    match req.poll_type {
        PollType::SingleChoice if max_selections != 1 => {
            return Err(ApiError::InvalidRequest(
                "single choice polls allow exactly one selection".into(),
            ));
        }
        PollType::MultipleChoice | PollType::RankedChoice if max_selections > option_count => {
            return Err(ApiError::InvalidRequest(
                "max_selections cannot exceed the number of options".into(),
            ));
        }
        _ => {}
    }

    Ok(max_selections)
}

/// Validate a vote against the poll it targets. Pure so the rules are
/// unit-testable without a database.
fn validate_vote(
    poll: &Poll,
    options: &[PollOption],
    req: &CastVoteRequest,
) -> Result<(), ApiError> {
    if poll.status != PollStatus::Active {
        return Err(ApiError::PollNotActive);
    }
    if req.option_ids.is_empty() {
        return Err(ApiError::InvalidRequest(
            "at least one option must be selected".into(),
        ));
    }

    let distinct: HashSet<Uuid> = req.option_ids.iter().copied().collect();
    if distinct.len() != req.option_ids.len() {
        return Err(ApiError::InvalidRequest(
            "an option may only be selected once".into(),
        ));
    }

    let known: HashSet<Uuid> = options.iter().map(|o| o.id).collect();
    if req.option_ids.iter().any(|id| !known.contains(id)) {
        return Err(ApiError::OptionNotFound);
    }

    let selected = req.option_ids.len();
    match poll.poll_type {
        PollType::SingleChoice if selected != 1 => {
            return Err(ApiError::InvalidRequest(
                "single choice polls accept exactly one option".into(),
            ));
        }
        PollType::MultipleChoice | PollType::RankedChoice
            if selected > poll.max_selections as usize =>
        {
            return Err(ApiError::InvalidRequest(format!(
                "at most {} options may be selected",
                poll.max_selections
            )));
        }
        _ => {}
    }

    match req.kind {
        VoteKind::Public => {
            if req.voter.as_deref().map_or(true, |v| v.trim().is_empty()) {
                return Err(ApiError::InvalidRequest(
                    "public votes require a voter address".into(),
                ));
            }
        }
        VoteKind::Private => {
            if req.voter.is_some() {
                return Err(ApiError::InvalidRequest(
                    "private votes must not include a voter address".into(),
                ));
            }
        }
    }

    Ok(())
}

impl ListPollsQuery {
    fn to_filter(&self) -> Result<PollFilter<'_>, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(|s| s.parse::<PollStatus>())
            .transpose()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let poll_type = self
            .poll_type
            .as_deref()
            .map(|t| t.parse::<PollType>())
            .transpose()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        Ok(PollFilter {
            status,
            creator: self.creator.as_deref(),
            poll_type,
        })
    }
}

/// Create a new poll with its options.
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let max_selections = validate_create(&payload)?;

    let now = Utc::now();
    if payload.end_date <= now {
        return Err(ApiError::InvalidRequest("end date is in the past".into()));
    }
    let status = PollStatus::for_window(now, payload.start_date, payload.end_date);

    let poll_id = poll_repository::create_poll(
        &app_state.db,
        NewPoll {
            title: payload.title.trim(),
            description: &payload.description,
            creator: payload.creator.trim(),
            poll_type: payload.poll_type,
            max_selections,
            status,
            network: payload.network.unwrap_or_default(),
            start_date: payload.start_date,
            end_date: payload.end_date,
        },
        &payload.options,
    )
    .await?;

    let poll = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    let options = poll_repository::get_poll_options(&app_state.db, poll_id).await?;

    info!("created poll {poll_id} ({status})");
    let _ = sse_tx.send(SseEvent::PollCreated {
        poll_id,
        title: poll.title.clone(),
    });

    Ok((StatusCode::CREATED, Json(poll_response(poll, options))))
}

/// List polls, optionally filtered by status, creator or type.
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
    Query(query): Query<ListPollsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.to_filter()?;
    let polls = poll_repository::list_polls(&app_state.db, &filter).await?;

    let mut responses = Vec::with_capacity(polls.len());
    for poll in polls {
        let options = poll_repository::get_poll_options(&app_state.db, poll.id).await?;
        responses.push(poll_response(poll, options));
    }

    Ok((StatusCode::OK, Json(responses)))
}

/// Get a single poll with its options and counts.
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    let options = poll_repository::get_poll_options(&app_state.db, poll_id).await?;

    Ok((StatusCode::OK, Json(poll_response(poll, options))))
}

/// Cast a vote. The vote row, its selections and every derived counter
/// are written in one transaction.
pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    let options = poll_repository::get_poll_options(&app_state.db, poll_id).await?;

    validate_vote(&poll, &options, &payload)?;

    let voter = payload.voter.as_deref().map(str::trim);
    if let Some(voter) = voter {
        if vote_repository::has_voted(&app_state.db, poll_id, voter).await? {
            return Err(ApiError::AlreadyVoted);
        }
    }

    let vote_id = vote_repository::cast_vote(
        &app_state.db,
        NewVote {
            poll_id,
            option_ids: &payload.option_ids,
            kind: payload.kind,
            voter,
            tx_id: payload.tx_id.as_deref(),
            verification_hash: payload.verification_hash.as_deref(),
            network: payload.network.unwrap_or(poll.network),
        },
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::RowNotFound => ApiError::OptionNotFound,
        other => ApiError::from(other),
    })?;

    let options = poll_repository::get_poll_options(&app_state.db, poll_id).await?;
    let total_votes = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .map(|p| p.total_votes)
        .unwrap_or(poll.total_votes + 1);

    let _ = sse_tx.send(SseEvent::VoteCast(VoteCast { poll_id, vote_id }));

    let response = CastVoteResponse {
        vote_id,
        total_votes,
        options: options
            .into_iter()
            .map(|opt| PollOptionResponse {
                id: opt.id,
                text: opt.option_text,
                position: opt.position,
                votes: opt.votes,
            })
            .collect(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the vote records for a poll, newest first.
pub async fn list_votes(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    let votes = vote_repository::list_votes(&app_state.db, poll_id).await?;
    let responses: Vec<VoteResponse> = votes
        .into_iter()
        .map(|record| VoteResponse {
            id: record.vote.id,
            voter: record.vote.voter,
            kind: record.vote.kind,
            options: record.options,
            tx_id: record.vote.tx_id,
            verification_hash: record.vote.verification_hash,
            network: record.vote.network,
            created_at: record.vote.created_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(responses)))
}

/// Tallied results: options sorted by votes with integer percentages.
pub async fn get_results(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    let options = poll_repository::get_poll_options(&app_state.db, poll_id).await?;

    let tallies = results::tally(&options, poll.total_votes);
    let leader = results::leader(&tallies);

    Ok((
        StatusCode::OK,
        Json(ResultsResponse {
            poll_id,
            status: poll.status,
            total_votes: poll.total_votes,
            results: tallies,
            leader,
        }),
    ))
}

/// End an active poll early (creator only).
pub async fn end_poll(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<CreatorRequest>,
) -> Result<impl IntoResponse + use<>, ApiError> {
    transition_poll(
        &app_state,
        &sse_tx,
        poll_id,
        &payload.creator,
        &[PollStatus::Active],
        PollStatus::Ended,
    )
    .await
}

/// Cancel a pending or active poll (creator only).
pub async fn cancel_poll(
    Extension(app_state): Extension<AppState>,
    Extension(sse_tx): Extension<SseSender>,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<CreatorRequest>,
) -> Result<impl IntoResponse + use<>, ApiError> {
    transition_poll(
        &app_state,
        &sse_tx,
        poll_id,
        &payload.creator,
        &[PollStatus::Pending, PollStatus::Active],
        PollStatus::Cancelled,
    )
    .await
}

async fn transition_poll(
    app_state: &AppState,
    sse_tx: &SseSender,
    poll_id: Uuid,
    creator: &str,
    expected: &[PollStatus],
    to: PollStatus,
) -> Result<impl IntoResponse + use<>, ApiError> {
    let poll = poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    if poll.creator != creator {
        return Err(ApiError::NotCreator);
    }

    let changed = poll_repository::set_status(&app_state.db, poll_id, expected, to).await?;
    if !changed {
        return Err(ApiError::InvalidTransition);
    }

    info!("poll {poll_id} moved to {to}");
    let _ = sse_tx.send(SseEvent::StatusChanged {
        poll_id,
        status: to,
    });

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "poll_id": poll_id,
            "status": to,
        })),
    ))
}

/// Recompute the derived counters from the stored vote records.
pub async fn recount_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    poll_repository::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    let summary = poll_repository::recount_votes(&app_state.db, poll_id).await?;
    if summary.total_before != summary.total_after {
        warn!(
            "recount adjusted poll {poll_id}: total {} -> {}",
            summary.total_before, summary.total_after
        );
    }

    Ok((StatusCode::OK, Json(summary)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_request() -> CreatePollRequest {
        CreatePollRequest {
            title: "Network upgrade".into(),
            description: "Pick the next upgrade window".into(),
            creator: "wallet_abc".into(),
            options: vec!["June".into(), "July".into(), "August".into()],
            poll_type: PollType::SingleChoice,
            max_selections: None,
            start_date: Utc::now() - Duration::hours(1),
            end_date: Utc::now() + Duration::days(7),
            network: None,
        }
    }

    fn sample_poll(poll_type: PollType, max_selections: i32) -> (Poll, Vec<PollOption>) {
        let poll_id = Uuid::new_v4();
        let now = Utc::now();
        let poll = Poll {
            id: poll_id,
            title: "t".into(),
            description: "d".into(),
            creator: "wallet_abc".into(),
            poll_type,
            max_selections,
            status: PollStatus::Active,
            network: Network::Mainnet,
            start_date: now - Duration::hours(1),
            end_date: now + Duration::hours(1),
            total_votes: 0,
            created_at: now,
            updated_at: now,
        };
        let options = (0..3)
            .map(|i| PollOption {
                id: Uuid::new_v4(),
                poll_id,
                option_text: format!("option {i}"),
                position: i,
                votes: 0,
            })
            .collect();
        (poll, options)
    }

    fn vote_request(option_ids: Vec<Uuid>, kind: VoteKind, voter: Option<&str>) -> CastVoteRequest {
        CastVoteRequest {
            option_ids,
            kind,
            voter: voter.map(String::from),
            tx_id: None,
            verification_hash: None,
            network: None,
        }
    }

    #[test]
    fn create_validation_accepts_well_formed_request() {
        assert_eq!(validate_create(&create_request()).unwrap(), 1);
    }

    #[test]
    fn create_validation_rejects_short_option_lists() {
        let mut req = create_request();
        req.options = vec!["only one".into()];
        assert!(matches!(
            validate_create(&req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn create_validation_rejects_inverted_window() {
        let mut req = create_request();
        req.end_date = req.start_date - Duration::hours(1);
        assert!(matches!(
            validate_create(&req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn create_validation_caps_multiple_choice_selections() {
        let mut req = create_request();
        req.poll_type = PollType::MultipleChoice;
        req.max_selections = Some(2);
        assert_eq!(validate_create(&req).unwrap(), 2);

        req.max_selections = Some(4); // more than the 3 options
        assert!(matches!(
            validate_create(&req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn ranked_choice_defaults_to_all_options() {
        let mut req = create_request();
        req.poll_type = PollType::RankedChoice;
        assert_eq!(validate_create(&req).unwrap(), 3);
    }

    #[test]
    fn vote_validation_accepts_public_single_choice() {
        let (poll, options) = sample_poll(PollType::SingleChoice, 1);
        let req = vote_request(vec![options[0].id], VoteKind::Public, Some("wallet_xyz"));
        assert!(validate_vote(&poll, &options, &req).is_ok());
    }

    #[test]
    fn vote_validation_rejects_inactive_poll() {
        let (mut poll, options) = sample_poll(PollType::SingleChoice, 1);
        poll.status = PollStatus::Ended;
        let req = vote_request(vec![options[0].id], VoteKind::Public, Some("wallet_xyz"));
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::PollNotActive)
        ));
    }

    #[test]
    fn vote_validation_rejects_unknown_option() {
        let (poll, options) = sample_poll(PollType::SingleChoice, 1);
        let req = vote_request(vec![Uuid::new_v4()], VoteKind::Public, Some("wallet_xyz"));
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::OptionNotFound)
        ));
    }

    #[test]
    fn vote_validation_rejects_duplicate_selections() {
        let (poll, options) = sample_poll(PollType::MultipleChoice, 2);
        let req = vote_request(
            vec![options[0].id, options[0].id],
            VoteKind::Public,
            Some("wallet_xyz"),
        );
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn vote_validation_enforces_max_selections() {
        let (poll, options) = sample_poll(PollType::MultipleChoice, 2);
        let req = vote_request(
            vec![options[0].id, options[1].id, options[2].id],
            VoteKind::Public,
            Some("wallet_xyz"),
        );
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn single_choice_takes_exactly_one_option() {
        let (poll, options) = sample_poll(PollType::SingleChoice, 1);
        let req = vote_request(
            vec![options[0].id, options[1].id],
            VoteKind::Public,
            Some("wallet_xyz"),
        );
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn public_votes_require_a_voter() {
        let (poll, options) = sample_poll(PollType::SingleChoice, 1);
        let req = vote_request(vec![options[0].id], VoteKind::Public, None);
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn private_votes_must_stay_anonymous() {
        let (poll, options) = sample_poll(PollType::SingleChoice, 1);
        let req = vote_request(vec![options[0].id], VoteKind::Private, Some("wallet_xyz"));
        assert!(matches!(
            validate_vote(&poll, &options, &req),
            Err(ApiError::InvalidRequest(_))
        ));

        let anonymous = vote_request(vec![options[0].id], VoteKind::Private, None);
        assert!(validate_vote(&poll, &options, &anonymous).is_ok());
    }

    #[test]
    fn ranked_votes_keep_submission_order_up_to_option_count() {
        let (poll, options) = sample_poll(PollType::RankedChoice, 3);
        let req = vote_request(
            vec![options[2].id, options[0].id, options[1].id],
            VoteKind::Public,
            Some("wallet_xyz"),
        );
        assert!(validate_vote(&poll, &options, &req).is_ok());
    }

    #[test]
    fn filter_parsing_is_case_insensitive() {
        let query = ListPollsQuery {
            status: Some("active".into()),
            creator: Some("wallet_abc".into()),
            poll_type: Some("ranked_choice".into()),
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.status, Some(PollStatus::Active));
        assert_eq!(filter.creator, Some("wallet_abc"));
        assert_eq!(filter.poll_type, Some(PollType::RankedChoice));
    }

    #[test]
    fn filter_parsing_rejects_unknown_status() {
        let query = ListPollsQuery {
            status: Some("archived".into()),
            creator: None,
            poll_type: None,
        };
        assert!(matches!(
            query.to_filter(),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
