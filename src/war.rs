use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::gateway::{endpoints, ApiClient};
use crate::league::rounds::time_until;
use crate::types::{ClanTag, War, WarPhase};

/// Regular clan war, as seen right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WarStatus {
    /// Seconds until the battle day starts (signed).
    Preparation { seconds_to_start: i64 },
    /// Seconds until the battle day ends (signed).
    InWar { seconds_to_end: i64 },
    NotActive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarRosterEntry {
    pub name: String,
    pub tag: String,
    pub map_position: u32,
}

pub fn status_of(war: &War, now: DateTime<Utc>) -> Result<WarStatus> {
    let missing = |what: &str| AppError::InvalidTimestamp(format!("war without {what}"));
    Ok(match war.state {
        WarPhase::Preparation => {
            let start = war.start_time.as_deref().ok_or_else(|| missing("startTime"))?;
            WarStatus::Preparation { seconds_to_start: time_until(start, now)?.num_seconds() }
        }
        WarPhase::InWar => {
            let end = war.end_time.as_deref().ok_or_else(|| missing("endTime"))?;
            WarStatus::InWar { seconds_to_end: time_until(end, now)?.num_seconds() }
        }
        _ => WarStatus::NotActive,
    })
}

/// Our side of the war ordered by map position. Available during
/// preparation, battle day, and after the war ended.
pub fn roster_of(war: &War, clan_tag: &ClanTag) -> Result<Vec<WarRosterEntry>> {
    if !matches!(war.state, WarPhase::Preparation | WarPhase::InWar | WarPhase::WarEnded) {
        return Err(AppError::WarNotActive);
    }
    let side = war.side_of(clan_tag).ok_or(AppError::WarNotActive)?;

    let mut roster: Vec<_> = side
        .members
        .iter()
        .map(|m| WarRosterEntry {
            name: m.name.clone(),
            tag: m.tag.to_string(),
            map_position: m.map_position,
        })
        .collect();
    roster.sort_by_key(|e| e.map_position);
    Ok(roster)
}

#[derive(Clone)]
pub struct WarWatcher {
    api: ApiClient,
}

impl WarWatcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn current_war(&self, clan_tag: &ClanTag) -> Result<War> {
        self.api.fetch_json(&endpoints::current_war(clan_tag)).await
    }

    pub async fn war_status(&self, clan_tag: &ClanTag) -> Result<WarStatus> {
        let war = self.current_war(clan_tag).await?;
        status_of(&war, Utc::now())
    }

    pub async fn war_roster(&self, clan_tag: &ClanTag) -> Result<Vec<WarRosterEntry>> {
        let war = self.current_war(clan_tag).await?;
        roster_of(&war, clan_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_client;
    use crate::types::Tag;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn war(state: &str) -> War {
        serde_json::from_value(json!({
            "state": state,
            "startTime": "20240115T130000.000Z",
            "endTime": "20240116T130000.000Z",
            "clan": { "tag": "#CLAN", "members": [
                { "tag": "#P2", "name": "b", "mapPosition": 2 },
                { "tag": "#P1", "name": "a", "mapPosition": 1 }
            ]},
            "opponent": { "tag": "#RIVAL", "members": [] }
        }))
        .unwrap()
    }

    #[test]
    fn status_counts_to_the_next_phase() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(
            status_of(&war("preparation"), now).unwrap(),
            WarStatus::Preparation { seconds_to_start: 3600 }
        );
        assert_eq!(
            status_of(&war("inWar"), now).unwrap(),
            WarStatus::InWar { seconds_to_end: 25 * 3600 }
        );
        assert_eq!(status_of(&war("warEnded"), now).unwrap(), WarStatus::NotActive);
    }

    #[test]
    fn roster_sorted_by_map_position() {
        let clan = Tag::parse("#CLAN").unwrap();
        let roster = roster_of(&war("warEnded"), &clan).unwrap();
        assert_eq!(roster[0].tag, "#P1");
        assert_eq!(roster[1].map_position, 2);

        assert!(matches!(
            roster_of(&war("notInWar"), &clan),
            Err(AppError::WarNotActive)
        ));
    }

    #[tokio::test]
    async fn not_in_war_reports_not_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clans/%23CLAN/currentwar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "notInWar" })))
            .mount(&server)
            .await;

        let watcher = WarWatcher::new(test_client(&server.uri()));
        let clan = Tag::parse("#CLAN").unwrap();
        assert_eq!(watcher.war_status(&clan).await.unwrap(), WarStatus::NotActive);
        assert!(matches!(watcher.war_roster(&clan).await, Err(AppError::WarNotActive)));
    }
}
