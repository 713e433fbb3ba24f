//! Read operations consumed by the presentation layer. Stored reads fall back
//! to one upstream populate on a miss.

use std::sync::Arc;
use std::time::Duration;

use crate::api::health::HealthState;
use crate::db::models::{LeagueMemberRow, MemberRow, RaidStatisticRow, WarResultRow};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::gateway::ApiClient;
use crate::league::{LeagueRoster, LeagueState, RefreshOutcome, ResultAggregator, RoundTracker};
use crate::poller::{ClanPoller, LeaguePoller};
use crate::raid::RaidRefresher;
use crate::roster::RosterSynchronizer;
use crate::types::{ClanTag, Tag};
use crate::war::{WarRosterEntry, WarStatus, WarWatcher};

#[derive(Clone)]
pub struct ClanSync {
    store: Store,
    roster: RosterSynchronizer,
    raids: RaidRefresher,
    rounds: RoundTracker,
    results: ResultAggregator,
    league_roster: LeagueRoster,
    league_poller: LeaguePoller,
    war: WarWatcher,
    league_poll_interval_secs: u64,
}

impl ClanSync {
    pub fn new(api: ApiClient, store: Store, league_poll_interval_secs: u64) -> Self {
        let league_roster = LeagueRoster::new(api.clone(), store.clone());
        Self {
            roster: RosterSynchronizer::new(api.clone(), store.clone()),
            raids: RaidRefresher::new(api.clone(), store.clone()),
            rounds: RoundTracker::new(api.clone()),
            results: ResultAggregator::new(api.clone(), store.clone()),
            league_poller: LeaguePoller::new(league_roster.clone()),
            league_roster,
            war: WarWatcher::new(api),
            store,
            league_poll_interval_secs,
        }
    }

    /// The process-lifetime poller sharing this instance's workers.
    pub fn clan_poller(&self, health: Arc<HealthState>, every: Duration) -> ClanPoller {
        ClanPoller::new(
            self.store.clone(),
            self.roster.clone(),
            self.raids.clone(),
            health,
            every,
        )
    }

    pub fn league_poller(&self) -> &LeaguePoller {
        &self.league_poller
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub async fn register_clan(&self, chat_id: i64, clan_tag: &ClanTag) -> Result<()> {
        self.store.register_clan(chat_id, clan_tag).await
    }

    pub async fn clan_for_chat(&self, chat_id: i64) -> Result<Option<ClanTag>> {
        self.store.clan_for_chat(chat_id).await
    }

    // -----------------------------------------------------------------------
    // Cached reads
    // -----------------------------------------------------------------------

    pub async fn roster(&self, clan_tag: &ClanTag) -> Result<Vec<MemberRow>> {
        let rows = self.store.members(clan_tag).await?;
        if !rows.is_empty() {
            return Ok(rows);
        }

        self.roster.sync_roster(clan_tag).await?;
        let rows = self.store.members(clan_tag).await?;
        if rows.is_empty() {
            return Err(AppError::EmptyAfterPopulate("member"));
        }
        Ok(rows)
    }

    pub async fn raid_statistics(&self, clan_tag: &ClanTag) -> Result<Vec<RaidStatisticRow>> {
        let rows = self.store.raid_statistics(clan_tag).await?;
        if !rows.is_empty() {
            return Ok(rows);
        }

        let members = self.roster(clan_tag).await?;
        let tags = members
            .iter()
            .map(|m| Tag::parse(&m.member_tag))
            .collect::<Result<Vec<_>>>()?;
        self.raids.refresh(clan_tag, &tags).await?;

        let rows = self.store.raid_statistics(clan_tag).await?;
        if rows.is_empty() {
            return Err(AppError::EmptyAfterPopulate("raid statistic"));
        }
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // War league
    // -----------------------------------------------------------------------

    pub async fn league_state(&self, clan_tag: &ClanTag) -> Result<LeagueState> {
        self.rounds.league_state(clan_tag).await
    }

    pub async fn league_results(&self, clan_tag: &ClanTag) -> Result<Vec<WarResultRow>> {
        self.results.league_results(clan_tag).await
    }

    /// League roster of the running tournament. Starts the background poll
    /// that keeps it fresh and removes it once the league ends.
    pub async fn league_members(&self, clan_tag: &ClanTag) -> Result<Vec<LeagueMemberRow>> {
        match self.league_roster.refresh(clan_tag).await? {
            RefreshOutcome::Finished { .. } => Err(AppError::TournamentEnded),
            RefreshOutcome::Active { .. } => {
                self.league_poller
                    .start_poll(clan_tag, self.league_poll_interval_secs);
                self.store.league_members(clan_tag).await
            }
            RefreshOutcome::Idle(_) => self.store.league_members(clan_tag).await,
        }
    }

    // -----------------------------------------------------------------------
    // Regular war
    // -----------------------------------------------------------------------

    pub async fn war_status(&self, clan_tag: &ClanTag) -> Result<WarStatus> {
        self.war.war_status(clan_tag).await
    }

    pub async fn war_roster(&self, clan_tag: &ClanTag) -> Result<Vec<WarRosterEntry>> {
        self.war.war_roster(clan_tag).await
    }
}
