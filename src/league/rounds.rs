use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::gateway::{endpoints, ApiClient};
use crate::types::{ClanTag, LeagueGroup, Tag, War, WarPhase, WarRound};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Upstream timestamp split into its fields, e.g. `20240115T183000.000Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ApiTimestamp {
    /// Parse by fixed character offsets: `YYYYMMDD` `T` `HHMMSS`, rest ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let field = |range: std::ops::Range<usize>| -> Result<u32> {
            raw.get(range)
                .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AppError::InvalidTimestamp(raw.to_string()))
        };
        if raw.as_bytes().get(8) != Some(&b'T') {
            return Err(AppError::InvalidTimestamp(raw.to_string()));
        }

        Ok(Self {
            year: field(0..4)? as i32,
            month: field(4..6)?,
            day: field(6..8)?,
            hour: field(9..11)?,
            minute: field(11..13)?,
            second: field(13..15)?,
        })
    }

    pub fn to_utc(&self) -> Result<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, self.minute, self.second))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| {
                AppError::InvalidTimestamp(format!(
                    "{:04}{:02}{:02}T{:02}{:02}{:02}",
                    self.year, self.month, self.day, self.hour, self.minute, self.second
                ))
            })
    }
}

/// `event_time - now`. Negative once the event has passed.
pub fn time_until(raw: &str, now: DateTime<Utc>) -> Result<chrono::Duration> {
    Ok(ApiTimestamp::parse(raw)?.to_utc()? - now)
}

// ---------------------------------------------------------------------------
// Round scanning
// ---------------------------------------------------------------------------

/// Index of the last round whose pairings are published: the round just
/// before the first unassigned one, or the final round if all are assigned.
/// `None` when the first round is still unassigned (or there are no rounds).
pub fn last_available_round(rounds: &[WarRound]) -> Option<usize> {
    match rounds.iter().position(|r| !r.is_assigned()) {
        Some(0) => None,
        Some(first_unassigned) => Some(first_unassigned - 1),
        None => rounds.len().checked_sub(1),
    }
}

/// Result of looking at a league group before any war is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundScan {
    Ended,
    NotStarted,
    Round { index: usize, total: usize, war_tag: Tag },
}

/// `ended` short-circuits: rounds are not looked at.
pub fn scan(group: &LeagueGroup) -> RoundScan {
    if group.is_ended() {
        return RoundScan::Ended;
    }
    let Some(index) = last_available_round(&group.rounds) else {
        return RoundScan::NotStarted;
    };
    match group.rounds[index].war_tags.first() {
        Some(war_tag) => RoundScan::Round {
            index,
            total: group.rounds.len(),
            war_tag: war_tag.clone(),
        },
        None => RoundScan::NotStarted,
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEvent {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeToTransition {
    pub event: RoundEvent,
    /// Signed: negative if the event is already past.
    pub seconds: i64,
}

impl TimeToTransition {
    /// Seconds to show a user; a passed event shows as zero.
    pub fn display_seconds(&self) -> i64 {
        self.seconds.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeagueState {
    NotStarted,
    RoundPreparation { round: usize, remaining: TimeToTransition },
    RoundInProgress { round: usize, remaining: TimeToTransition },
    Ended,
}

/// Time to the next transition of round `index` out of `total`, given the
/// live war of that round.
///
/// Round 0 counts to its start, the terminal round to its start while in
/// preparation and to its end otherwise, every other round to its end. Only
/// the last published round carries meaningful timestamps.
pub fn transition(index: usize, total: usize, war: &War, now: DateTime<Utc>) -> Result<LeagueState> {
    let terminal = index + 1 == total;
    let event = match index {
        0 => RoundEvent::Start,
        _ if terminal && war.state == WarPhase::Preparation => RoundEvent::Start,
        _ => RoundEvent::End,
    };

    let raw = match event {
        RoundEvent::Start => war.start_time.as_deref(),
        RoundEvent::End => war.end_time.as_deref(),
    }
    .ok_or_else(|| AppError::InvalidTimestamp(format!("round {index} has no {event:?} time")))?;

    let remaining = TimeToTransition {
        event,
        seconds: time_until(raw, now)?.num_seconds(),
    };

    Ok(match war.state {
        WarPhase::Preparation => LeagueState::RoundPreparation { round: index, remaining },
        _ => LeagueState::RoundInProgress { round: index, remaining },
    })
}

/// Stateless: every call derives the state from a fresh fetch.
#[derive(Clone)]
pub struct RoundTracker {
    api: ApiClient,
}

impl RoundTracker {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn league_state(&self, clan_tag: &ClanTag) -> Result<LeagueState> {
        let group: LeagueGroup = self
            .api
            .fetch_json(&endpoints::league_group(clan_tag))
            .await?;

        match scan(&group) {
            RoundScan::Ended => Ok(LeagueState::Ended),
            RoundScan::NotStarted => Ok(LeagueState::NotStarted),
            RoundScan::Round { index, total, war_tag } => {
                debug!(clan = %clan_tag, round = index, war = %war_tag, "Last available round");
                let war: War = self.api.fetch_json(&endpoints::league_war(&war_tag)).await?;
                transition(index, total, &war, Utc::now())
            }
        }
    }
}
