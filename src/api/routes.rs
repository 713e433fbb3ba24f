use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::db::models::{LeagueMemberRow, MemberRow, RaidStatisticRow, WarResultRow};
use crate::error::AppError;
use crate::league::LeagueState;
use crate::queries::ClanSync;
use crate::types::ClanTag;
use crate::war::{WarRosterEntry, WarStatus};

#[derive(Clone)]
pub struct ApiState {
    pub sync: ClanSync,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/clans/:tag/members", get(get_members))
        .route("/clans/:tag/raids", get(get_raids))
        .route("/clans/:tag/war", get(get_war))
        .route("/clans/:tag/war/members", get(get_war_members))
        .route("/clans/:tag/league", get(get_league))
        .route("/clans/:tag/league/members", get(get_league_members))
        .route("/clans/:tag/league/results", get(get_league_results))
        .route("/chats/:chat_id/clan", post(post_chat_clan).get(get_chat_clan))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterClanRequest {
    pub clan_tag: String,
}

#[derive(Serialize)]
pub struct ChatClanResponse {
    pub chat_id: i64,
    pub clan_tag: String,
}

/// Signed seconds live in the state; `display_seconds` never goes below 0.
#[derive(Serialize)]
pub struct LeagueStateResponse {
    #[serde(flatten)]
    pub state: LeagueState,
    pub display_seconds: Option<i64>,
}

#[derive(Serialize)]
pub struct WarStatusResponse {
    #[serde(flatten)]
    pub status: WarStatus,
    pub display_seconds: Option<i64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub last_clan_poll_at: Option<u64>,
    pub clan_poll_failures: u64,
    pub league_polls: Vec<String>,
}

fn clan_tag(raw: &str) -> Result<ClanTag, AppError> {
    raw.parse()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_members(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<MemberRow>>, AppError> {
    Ok(Json(state.sync.roster(&clan_tag(&tag)?).await?))
}

async fn get_raids(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<RaidStatisticRow>>, AppError> {
    Ok(Json(state.sync.raid_statistics(&clan_tag(&tag)?).await?))
}

async fn get_war(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<WarStatusResponse>, AppError> {
    let status = state.sync.war_status(&clan_tag(&tag)?).await?;
    let display_seconds = match status {
        WarStatus::Preparation { seconds_to_start: s } | WarStatus::InWar { seconds_to_end: s } => {
            Some(s.max(0))
        }
        WarStatus::NotActive => None,
    };
    Ok(Json(WarStatusResponse { status, display_seconds }))
}

async fn get_war_members(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<WarRosterEntry>>, AppError> {
    Ok(Json(state.sync.war_roster(&clan_tag(&tag)?).await?))
}

async fn get_league(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<LeagueStateResponse>, AppError> {
    let league = state.sync.league_state(&clan_tag(&tag)?).await?;
    let display_seconds = match league {
        LeagueState::RoundPreparation { remaining, .. }
        | LeagueState::RoundInProgress { remaining, .. } => Some(remaining.display_seconds()),
        LeagueState::NotStarted | LeagueState::Ended => None,
    };
    Ok(Json(LeagueStateResponse { state: league, display_seconds }))
}

async fn get_league_members(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<LeagueMemberRow>>, AppError> {
    Ok(Json(state.sync.league_members(&clan_tag(&tag)?).await?))
}

async fn get_league_results(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<WarResultRow>>, AppError> {
    Ok(Json(state.sync.league_results(&clan_tag(&tag)?).await?))
}

async fn post_chat_clan(
    State(state): State<ApiState>,
    Path(chat_id): Path<i64>,
    Json(body): Json<RegisterClanRequest>,
) -> Result<Json<ChatClanResponse>, AppError> {
    let tag = clan_tag(&body.clan_tag)?;
    state.sync.register_clan(chat_id, &tag).await?;
    Ok(Json(ChatClanResponse { chat_id, clan_tag: tag.to_string() }))
}

async fn get_chat_clan(
    State(state): State<ApiState>,
    Path(chat_id): Path<i64>,
) -> Result<Json<ChatClanResponse>, AppError> {
    let tag = state
        .sync
        .clan_for_chat(chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("clan for chat {chat_id}")))?;
    Ok(Json(ChatClanResponse { chat_id, clan_tag: tag.to_string() }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_clan_poll_at();
    Json(HealthResponse {
        status: "ok",
        last_clan_poll_at: (last > 0).then_some(last),
        clan_poll_failures: state.health.clan_poll_failures(),
        league_polls: state.sync.league_poller().running(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
