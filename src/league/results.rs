use std::sync::Arc;

use dashmap::DashSet;
use tracing::{info, warn};

use crate::db::models::WarResultRow;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::gateway::{endpoints, ApiClient};
use crate::types::{ClanTag, LeagueGroup, War, WarObservation};

/// War-league accumulator. Aggregates a finished tournament once per
/// `(clan, season)` and serves the stored rows afterwards.
#[derive(Clone)]
pub struct ResultAggregator {
    api: ApiClient,
    store: Store,
    /// Clans with a `league_results` call in progress in this process.
    in_flight: Arc<DashSet<ClanTag>>,
}

/// Removes the clan from the in-flight set when the aggregation ends,
/// whether it finished, failed or was dropped.
struct InFlight<'a> {
    set: &'a DashSet<ClanTag>,
    clan_tag: ClanTag,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.clan_tag);
    }
}

impl ResultAggregator {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self {
            api,
            store,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Results of the clan's last finished tournament, best average first.
    pub async fn league_results(&self, clan_tag: &ClanTag) -> Result<Vec<WarResultRow>> {
        let group: LeagueGroup = self
            .api
            .fetch_json(&endpoints::league_group(clan_tag))
            .await?;
        if !group.is_ended() {
            return Err(AppError::TournamentNotEnded);
        }
        if group.find_clan(clan_tag).is_none() {
            return Err(AppError::ClanNotInTournament(clan_tag.clone()));
        }

        let season = group.season.clone().unwrap_or_default();
        if self.store.has_war_results(clan_tag, &season).await? {
            return self.store.war_results(clan_tag).await;
        }

        // Claim the clan, then check presence again under the claim: a caller
        // that raced a finishing aggregation must not add the wars twice.
        if !self.in_flight.insert(clan_tag.clone()) {
            return Err(AppError::AggregationInProgress(clan_tag.clone()));
        }
        let _guard = InFlight {
            set: &self.in_flight,
            clan_tag: clan_tag.clone(),
        };

        if self.store.has_war_results(clan_tag, &season).await? {
            return self.store.war_results(clan_tag).await;
        }

        let count = self.aggregate(&group, clan_tag, &season).await?;
        info!(clan = %clan_tag, season = %season, observations = count, "League results aggregated for {clan_tag}");

        self.store.war_results(clan_tag).await
    }

    /// Fetch every published war first, then write. A network failure on any
    /// war aborts before the first write, so a retry starts from a clean slate.
    async fn aggregate(&self, group: &LeagueGroup, clan_tag: &ClanTag, season: &str) -> Result<usize> {
        let mut observations = Vec::new();

        let war_tags = group
            .rounds
            .iter()
            .flat_map(|r| r.war_tags.iter())
            .filter(|t| !t.is_unassigned());

        for war_tag in war_tags {
            let resp = self.api.fetch(&endpoints::league_war(war_tag)).await?;
            if resp.is_not_found() {
                warn!(war = %war_tag, "League war not found, skipping");
                continue;
            }
            let war: War = resp.into_payload(war_tag.as_str())?;
            observations.extend(observations_for(&war, clan_tag));
        }

        let stale = self.store.delete_war_results_except(clan_tag, season).await?;
        if stale > 0 {
            info!(clan = %clan_tag, stale, "Dropped results of a previous season");
        }

        for obs in &observations {
            self.store.add_war_result(obs, clan_tag, season).await?;
        }
        Ok(observations.len())
    }
}

/// One observation per member of the clan's side; empty if the clan did not
/// play this war.
pub fn observations_for(war: &War, clan_tag: &ClanTag) -> Vec<WarObservation> {
    war.side_of(clan_tag)
        .map(|side| {
            side.members
                .iter()
                .map(|m| WarObservation {
                    member_name: m.name.clone(),
                    member_tag: m.tag.clone(),
                    stars: m.first_attack_stars(),
                })
                .collect()
        })
        .unwrap_or_default()
}
