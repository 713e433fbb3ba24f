use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::types::ClanTag;

#[derive(Debug, Error)]
pub enum AppError {
    /// Upstream 404: clan, war or player missing or private.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("War league has already ended")]
    TournamentEnded,

    #[error("War league has not ended yet")]
    TournamentNotEnded,

    #[error("Clan {0} is not part of the current war league")]
    ClanNotInTournament(ClanTag),

    /// Another request is aggregating this clan's league results right now.
    #[error("League results for {0} are being aggregated, retry shortly")]
    AggregationInProgress(ClanTag),

    #[error("Clan is not in an active war")]
    WarNotActive,

    /// Connection-level failure talking to the upstream API.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected upstream status: {0}")]
    UnexpectedStatus(u16),

    #[error("No {0} rows after populating from upstream")]
    EmptyAfterPopulate(&'static str),

    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) | AppError::ClanNotInTournament(_) => StatusCode::NOT_FOUND,
            AppError::TournamentEnded
            | AppError::TournamentNotEnded
            | AppError::AggregationInProgress(_)
            | AppError::WarNotActive => StatusCode::CONFLICT,
            AppError::Network(_) | AppError::UnexpectedStatus(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidTag(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
