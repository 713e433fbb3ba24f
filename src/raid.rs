use tracing::{info, warn};

use crate::config::achievements;
use crate::db::Store;
use crate::error::Result;
use crate::gateway::{endpoints, ApiClient};
use crate::types::{ClanTag, Player, RaidStatistic, Tag};

/// Raid coins of a player, read from its achievements.
///
/// Looks the two capital-gold achievements up by name. Accounts that do not
/// report them by name fall back to the last two entries of the list
/// (collected, then donated), which is where the game puts them.
pub fn statistic_from_player(player: &Player) -> Option<RaidStatistic> {
    let by_name = |name: &str| {
        player
            .achievements
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value)
    };

    let (collected, donated) = match (
        by_name(achievements::CAPITAL_GOLD_COLLECTED),
        by_name(achievements::CAPITAL_GOLD_DONATED),
    ) {
        (Some(c), Some(d)) => (c, d),
        _ => match player.achievements.as_slice() {
            [.., c, d] => (c.value, d.value),
            _ => return None,
        },
    };

    Some(RaidStatistic::new(
        player.name.clone(),
        player.tag.clone(),
        collected,
        donated,
    ))
}

/// Raid-statistic snapshot: every refresh overwrites the stored row of each
/// member with the cumulative upstream value.
#[derive(Clone)]
pub struct RaidRefresher {
    api: ApiClient,
    store: Store,
}

impl RaidRefresher {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    /// Fetch each member and overwrite its stored statistic. Members that are
    /// missing upstream or carry no achievements are skipped; a network
    /// failure aborts the remaining members. Returns the number stored.
    pub async fn refresh(&self, clan_tag: &ClanTag, members: &[Tag]) -> Result<usize> {
        let mut stored = 0;
        for member_tag in members {
            let resp = self.api.fetch(&endpoints::player(member_tag)).await?;
            if resp.is_not_found() {
                warn!(clan = %clan_tag, member = %member_tag, "Player not found, raid statistic skipped");
                continue;
            }
            let player: Player = resp.into_payload(member_tag.as_str())?;

            let Some(stat) = statistic_from_player(&player) else {
                warn!(member = %member_tag, "Player has no capital achievements");
                continue;
            };
            self.store.upsert_raid_statistic(&stat, clan_tag).await?;
            stored += 1;
        }

        info!(clan = %clan_tag, stored, "Raid statistics refreshed for {clan_tag}: {stored}/{}", members.len());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_client;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn player(achievements: serde_json::Value) -> Player {
        serde_json::from_value(json!({
            "tag": "#P1", "name": "a", "achievements": achievements
        }))
        .unwrap()
    }

    #[test]
    fn reads_capital_achievements_by_name() {
        let p = player(json!([
            { "name": "Most Valuable Clanmate", "value": 40 },
            { "name": "Aggressive Capitalism", "value": 100 },
            { "name": "Bigger Coffers", "value": 10 }
        ]));
        let stat = statistic_from_player(&p).unwrap();
        assert_eq!((stat.collected, stat.donated, stat.saved), (100, 40, 60));
    }

    #[test]
    fn falls_back_to_last_two_achievements() {
        let p = player(json!([
            { "name": "Bigger Coffers", "value": 10 },
            { "name": "x", "value": 500 },
            { "name": "y", "value": 200 }
        ]));
        let stat = statistic_from_player(&p).unwrap();
        assert_eq!((stat.collected, stat.donated, stat.saved), (500, 200, 300));

        assert!(statistic_from_player(&player(json!([{ "name": "x", "value": 1 }]))).is_none());
    }

    async fn mount_player(server: &MockServer, collected: i64, donated: i64) {
        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/players/%23P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag": "#P1",
                "name": "a",
                "achievements": [
                    { "name": "Aggressive Capitalism", "value": collected },
                    { "name": "Most Valuable Clanmate", "value": donated }
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn second_refresh_overwrites() {
        let server = MockServer::start().await;
        let store = Store::in_memory().await;
        let raids = RaidRefresher::new(test_client(&server.uri()), store.clone());
        let clan = Tag::parse("#CLAN").unwrap();
        let members = vec![Tag::parse("#P1").unwrap(), Tag::parse("#GHOST").unwrap()];

        mount_player(&server, 100, 20).await;
        assert_eq!(raids.refresh(&clan, &members).await.unwrap(), 1);
        mount_player(&server, 150, 20).await;
        raids.refresh(&clan, &members).await.unwrap();

        let rows = store.raid_statistics(&clan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            (rows[0].collected_coins, rows[0].donated_coins, rows[0].saved_coins),
            (150, 20, 130)
        );
    }
}
