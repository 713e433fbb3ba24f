//! Shared health state for the /health endpoint.
//! Updated by the clan poller, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last completed clan-level tick (0 = none).
    pub last_clan_poll_at: AtomicU64,
    /// Clan-level ticks abandoned because of an error.
    pub clan_poll_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_clan_poll_at(&self, secs: u64) {
        self.last_clan_poll_at.store(secs, Ordering::Relaxed);
    }

    pub fn inc_clan_poll_failures(&self) {
        self.clan_poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_clan_poll_at(&self) -> u64 {
        self.last_clan_poll_at.load(Ordering::Relaxed)
    }

    pub fn clan_poll_failures(&self) -> u64 {
        self.clan_poll_failures.load(Ordering::Relaxed)
    }
}
