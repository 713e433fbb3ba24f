use tracing::info;

use crate::db::Store;
use crate::error::Result;
use crate::gateway::{endpoints, ApiClient};
use crate::types::{ClanTag, Member, MemberList};

/// Outcome of one roster reconciliation.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The authoritative roster as fetched.
    pub members: Vec<Member>,
    /// Stored members deleted because they left the clan.
    pub removed: u64,
}

/// Reconciles the stored roster of a clan with the upstream member list.
#[derive(Clone)]
pub struct RosterSynchronizer {
    api: ApiClient,
    store: Store,
}

impl RosterSynchronizer {
    pub fn new(api: ApiClient, store: Store) -> Self {
        Self { api, store }
    }

    /// Fetch the member list, delete departed members, upsert everyone else.
    ///
    /// A 404 aborts before any write, so a clan that is briefly unreachable
    /// keeps its stored roster. Writes are individual statements: a concurrent
    /// reader may observe the roster half-replaced.
    pub async fn sync_roster(&self, clan_tag: &ClanTag) -> Result<SyncReport> {
        let list: MemberList = self
            .api
            .fetch_json(&endpoints::clan_members(clan_tag))
            .await?;
        let members = list.items;

        let keep: Vec<&str> = members.iter().map(|m| m.tag.as_str()).collect();
        let removed = self.store.delete_members_not_in(clan_tag, &keep).await?;

        for member in &members {
            self.store.upsert_member(member, clan_tag).await?;
        }

        info!(
            clan = %clan_tag,
            members = members.len(),
            removed,
            "Roster synced for {clan_tag}: {} members, -{removed} departed",
            members.len(),
        );

        Ok(SyncReport { members, removed })
    }
}
