use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::LEAGUE_POLL_TASK;
use crate::error::AppError;
use crate::league::{LeagueRoster, RefreshOutcome};
use crate::poller::registry::TaskRegistry;
use crate::types::ClanTag;

/// Starts and tracks the per-tournament member-list polls.
#[derive(Clone)]
pub struct LeaguePoller {
    roster: LeagueRoster,
    registry: TaskRegistry,
}

impl LeaguePoller {
    pub fn new(roster: LeagueRoster) -> Self {
        Self {
            roster,
            registry: TaskRegistry::new(LEAGUE_POLL_TASK),
        }
    }

    /// Start polling the clan's league group every `interval_secs`.
    /// No-op while a poll for this clan is running; returns whether one started.
    pub fn start_poll(&self, clan_tag: &ClanTag, interval_secs: u64) -> bool {
        self.start_poll_every(clan_tag, Duration::from_secs(interval_secs.max(1)))
    }

    pub fn start_poll_every(&self, clan_tag: &ClanTag, every: Duration) -> bool {
        let started = self.registry.try_start(
            clan_tag,
            run(self.roster.clone(), clan_tag.clone(), every),
        );
        if !started {
            debug!(task = %self.registry.task_name(clan_tag), "Poll already running");
        }
        started
    }

    pub fn is_running(&self, clan_tag: &ClanTag) -> bool {
        self.registry.is_running(clan_tag)
    }

    pub fn running(&self) -> Vec<String> {
        self.registry.running()
    }
}

/// Ticks until the tournament is over or no longer lists the clan. The first
/// tick is skipped: the caller just refreshed.
async fn run(roster: LeagueRoster, clan_tag: ClanTag, every: Duration) {
    let mut ticker = interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match roster.refresh(&clan_tag).await {
            Ok(RefreshOutcome::Finished { removed }) => {
                info!(clan = %clan_tag, removed, "War league over, stopping poll");
                return;
            }
            Ok(RefreshOutcome::Active { fetched }) => {
                debug!(clan = %clan_tag, fetched, "League poll tick");
            }
            Ok(RefreshOutcome::Idle(state)) => {
                debug!(clan = %clan_tag, %state, "League poll tick, nothing to do");
            }
            Err(AppError::ClanNotInTournament(_)) => {
                match roster.clear(&clan_tag).await {
                    Ok(removed) => info!(clan = %clan_tag, removed, "Clan left the war league, stopping poll"),
                    Err(e) => warn!(clan = %clan_tag, "Clan left the war league, cleanup failed: {e}"),
                }
                return;
            }
            Err(e) if e.is_not_found() => {
                warn!(clan = %clan_tag, "League group not found: {e}");
            }
            Err(e) => {
                warn!(clan = %clan_tag, "League poll tick abandoned: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::gateway::test_client;
    use crate::types::{LeagueMember, Tag};
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn poll_cleans_up_and_exits_when_league_ends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clans/%23ABC/currentwar/leaguegroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "ended", "clans": [], "rounds": []
            })))
            .mount(&server)
            .await;

        let store = Store::in_memory().await;
        let clan = Tag::parse("#ABC").unwrap();
        let stale = LeagueMember { name: "a".into(), tag: Tag::parse("#P1").unwrap(), town_hall_level: 12 };
        store.insert_league_member(&stale, &clan).await.unwrap();

        let poller = LeaguePoller::new(LeagueRoster::new(test_client(&server.uri()), store.clone()));
        assert!(poller.start_poll_every(&clan, Duration::from_millis(10)));
        assert!(!poller.start_poll_every(&clan, Duration::from_millis(10)));

        for _ in 0..200 {
            if !poller.is_running(&clan) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!poller.is_running(&clan));
        assert!(store.league_members(&clan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn poll_survives_not_found_ticks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Store::in_memory().await;
        let clan = Tag::parse("#ABC").unwrap();
        let poller = LeaguePoller::new(LeagueRoster::new(test_client(&server.uri()), store));
        poller.start_poll_every(&clan, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(poller.is_running(&clan));
        assert_eq!(poller.running(), vec!["PollCWL_memberlist:#ABC".to_string()]);
    }

    #[tokio::test]
    async fn poll_stops_when_group_no_longer_lists_clan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clans/%23ABC/currentwar/leaguegroup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "inWar", "clans": [{ "tag": "#XYZ", "members": [] }], "rounds": []
            })))
            .mount(&server)
            .await;

        let store = Store::in_memory().await;
        let clan = Tag::parse("#ABC").unwrap();
        let stale = LeagueMember { name: "a".into(), tag: Tag::parse("#P1").unwrap(), town_hall_level: 12 };
        store.insert_league_member(&stale, &clan).await.unwrap();

        let poller = LeaguePoller::new(LeagueRoster::new(test_client(&server.uri()), store.clone()));
        assert!(poller.start_poll_every(&clan, Duration::from_millis(10)));

        for _ in 0..200 {
            if !poller.is_running(&clan) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!poller.is_running(&clan));
        assert!(store.league_members(&clan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn poll_survives_network_failures() {
        // Nothing listens on port 9 of localhost.
        let roster = LeagueRoster::new(test_client("http://127.0.0.1:9"), Store::in_memory().await);
        let clan = Tag::parse("#ABC").unwrap();
        let poller = LeaguePoller::new(roster);
        assert!(poller.start_poll_every(&clan, Duration::from_millis(5)));

        // Many intervals' worth of refused connections.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.is_running(&clan));
        assert!(!poller.start_poll_every(&clan, Duration::from_millis(5)));
    }
}
