use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("poll not found")]
    PollNotFound,
    #[error("poll option not found")]
    OptionNotFound,
    #[error("poll is not active")]
    PollNotActive,
    #[error("poll is not in a state that allows this")]
    InvalidTransition,
    #[error("voter already voted on this poll")]
    AlreadyVoted,
    #[error("only the poll creator may do this")]
    NotCreator,
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            ApiError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            ApiError::OptionNotFound => (StatusCode::NOT_FOUND, "Poll option not found"),
            ApiError::PollNotActive => (StatusCode::BAD_REQUEST, "Poll is not active"),
            ApiError::InvalidTransition => (StatusCode::BAD_REQUEST, "Invalid status transition"),
            ApiError::AlreadyVoted => (StatusCode::CONFLICT, "Already voted on this poll"),
            ApiError::NotCreator => (StatusCode::FORBIDDEN, "Not the poll creator"),
            ApiError::Database(source) => {
                // Details go to the log, never to the client.
                error!("database error: {source}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = error {
            // Partial unique index on votes(poll_id, voter).
            if db_err.constraint() == Some("idx_votes_poll_voter") {
                return ApiError::AlreadyVoted;
            }
        }
        ApiError::Database(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_do_not_leak_sql_details() {
        let err = ApiError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.to_string(), "database error");
    }

    #[test]
    fn invalid_request_keeps_reason() {
        let err = ApiError::InvalidRequest("at least 2 options required".into());
        assert_eq!(
            err.to_string(),
            "invalid request: at least 2 options required"
        );
    }
}
