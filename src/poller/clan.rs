use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::db::Store;
use crate::error::Result;
use crate::raid::RaidRefresher;
use crate::roster::RosterSynchronizer;

/// Process-lifetime poller: roster sync and raid snapshot for every
/// registered clan, once per interval.
pub struct ClanPoller {
    store: Store,
    roster: RosterSynchronizer,
    raids: RaidRefresher,
    health: Arc<HealthState>,
    every: Duration,
}

/// Counts of one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub synced: usize,
    pub skipped: usize,
}

impl ClanPoller {
    pub fn new(
        store: Store,
        roster: RosterSynchronizer,
        raids: RaidRefresher,
        health: Arc<HealthState>,
        every: Duration,
    ) -> Self {
        Self { store, roster, raids, health, every }
    }

    /// The first tick fires immediately, so registered clans are synced at
    /// startup rather than one interval later.
    pub async fn run(self) {
        let mut ticker = interval(self.every);

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(report) => {
                    self.health.set_last_clan_poll_at(now_secs());
                    info!(
                        synced = report.synced,
                        skipped = report.skipped,
                        "Clan poll complete: {} synced, {} skipped",
                        report.synced,
                        report.skipped,
                    );
                }
                Err(e) => {
                    self.health.inc_clan_poll_failures();
                    error!("Clan poll tick abandoned: {e}");
                }
            }
        }
    }

    /// One pass over all registered clans. A clan that is gone upstream is
    /// logged and skipped; any other failure abandons the rest of the tick.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();

        for clan_tag in self.store.registered_clans().await? {
            let synced = match self.roster.sync_roster(&clan_tag).await {
                Ok(s) => s,
                Err(e) if e.is_not_found() => {
                    warn!(clan = %clan_tag, "Clan not found, skipped: {e}");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let tags: Vec<_> = synced.members.iter().map(|m| m.tag.clone()).collect();
            self.raids.refresh(&clan_tag, &tags).await?;
            report.synced += 1;
        }

        Ok(report)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
