//! At most one running poll task per clan.
//!
//! The map is keyed by clan tag; the occupied-check and the insert happen
//! under the same shard lock, so two concurrent starts cannot both spawn.
//! A task frees its own slot when it returns. A task that panicked leaves a
//! finished handle behind, which the next start treats as free.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::info;

use crate::types::ClanTag;

struct PollHandle {
    id: u64,
    name: String,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct TaskRegistry {
    prefix: &'static str,
    tasks: Arc<DashMap<ClanTag, PollHandle>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            tasks: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn task_name(&self, clan_tag: &ClanTag) -> String {
        format!("{}:{}", self.prefix, clan_tag)
    }

    /// Spawn `task` for `clan_tag` unless a task for it is still running.
    /// Returns whether a task was spawned.
    pub fn try_start<F>(&self, clan_tag: &ClanTag, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.tasks.entry(clan_tag.clone()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().handle.is_finished() {
                    return false;
                }
                let handle = self.spawn(clan_tag, task);
                slot.insert(handle);
            }
            Entry::Vacant(slot) => {
                let handle = self.spawn(clan_tag, task);
                slot.insert(handle);
            }
        }
        true
    }

    fn spawn<F>(&self, clan_tag: &ClanTag, task: F) -> PollHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = self.task_name(clan_tag);
        let tasks = Arc::clone(&self.tasks);
        let key = clan_tag.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            task.await;
            // Only clear the slot if it still holds this task.
            tasks.remove_if(&key, |_, h| h.id == id);
            info!(task = %task_name, "Poll task finished");
        });
        info!(task = %name, "Poll task started");

        PollHandle { id, name, handle }
    }

    pub fn is_running(&self, clan_tag: &ClanTag) -> bool {
        self.tasks
            .get(clan_tag)
            .is_some_and(|h| !h.handle.is_finished())
    }

    /// Names of the tasks currently running.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .iter()
            .filter(|e| !e.value().handle.is_finished())
            .map(|e| e.value().name.clone())
            .collect();
        names.sort();
        names
    }
}
