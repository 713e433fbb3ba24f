use tracing::{debug, info};

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::gateway::{endpoints, ApiClient};
use crate::types::{ClanTag, LeagueGroup, WarPhase};

/// What one refresh of the league member list did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Tournament running: the clan's league roster was stored.
    Active { fetched: usize },
    /// Tournament over: the clan's stored league roster was dropped.
    Finished { removed: u64 },
    /// Any other group state; nothing written.
    Idle(WarPhase),
}

/// Cache of the members a clan fielded in the current war league.
#[derive(Clone)]
pub struct LeagueRoster {
    api: ApiClient,
    store: Store,
}

impl LeagueRoster {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    /// Drop the clan's stored league roster.
    pub async fn clear(&self, clan_tag: &ClanTag) -> Result<u64> {
        self.store.delete_league_members(clan_tag).await
    }

    /// One tick of the league member poll. Members are inserted
    /// insert-or-ignore; existing rows are never rewritten.
    pub async fn refresh(&self, clan_tag: &ClanTag) -> Result<RefreshOutcome> {
        let group: LeagueGroup = self
            .api
            .fetch_json(&endpoints::league_group(clan_tag))
            .await?;

        match group.state {
            WarPhase::Ended | WarPhase::NotInWar => {
                let removed = self.clear(clan_tag).await?;
                info!(clan = %clan_tag, removed, state = %group.state, "League over, member list dropped");
                Ok(RefreshOutcome::Finished { removed })
            }
            state if state.is_active() => {
                let clan = group
                    .find_clan(clan_tag)
                    .ok_or_else(|| AppError::ClanNotInTournament(clan_tag.clone()))?;
                for member in &clan.members {
                    self.store.insert_league_member(member, clan_tag).await?;
                }
                debug!(clan = %clan_tag, fetched = clan.members.len(), "League member list refreshed");
                Ok(RefreshOutcome::Active { fetched: clan.members.len() })
            }
            other => Ok(RefreshOutcome::Idle(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_client;
    use crate::types::Tag;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn mount_group(server: &MockServer, state: &str) {
        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/clans/%23CLAN/currentwar/leaguegroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": state,
                "season": "2024-01",
                "clans": [{
                    "tag": "#CLAN",
                    "name": "Home",
                    "members": [
                        { "name": "a", "tag": "#P1", "townHallLevel": 15 },
                        { "name": "b", "tag": "#P2", "townHallLevel": 13 }
                    ]
                }],
                "rounds": []
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn active_league_stores_members_then_end_drops_them() {
        let server = MockServer::start().await;
        let store = Store::in_memory().await;
        let roster = LeagueRoster::new(test_client(&server.uri()), store.clone());
        let clan = Tag::parse("#CLAN").unwrap();

        mount_group(&server, "inWar").await;
        assert_eq!(roster.refresh(&clan).await.unwrap(), RefreshOutcome::Active { fetched: 2 });
        // Re-running does not duplicate.
        roster.refresh(&clan).await.unwrap();
        let rows = store.league_members(&clan).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].member_tag, "#P1");

        mount_group(&server, "ended").await;
        assert_eq!(roster.refresh(&clan).await.unwrap(), RefreshOutcome::Finished { removed: 2 });
        assert!(store.league_members(&clan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clan_missing_from_running_group() {
        let server = MockServer::start().await;
        mount_group(&server, "preparation").await;
        Mock::given(method("GET"))
            .and(path("/clans/%23RIVAL/currentwar/leaguegroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "preparation", "clans": [{ "tag": "#CLAN" }], "rounds": []
            })))
            .mount(&server)
            .await;

        let roster = LeagueRoster::new(test_client(&server.uri()), Store::in_memory().await);
        let err = roster.refresh(&Tag::parse("#RIVAL").unwrap()).await.unwrap_err();
        assert!(matches!(err, AppError::ClanNotInTournament(_)));
    }
}
