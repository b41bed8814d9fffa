//! Guild snapshot cache
//!
//! Holds the last known [`Guild`] per guild id. Each guild has a generation
//! counter that every write bumps; a refresh may only publish its snapshot if
//! no write happened since it started, so a slow refresh can't overwrite a
//! newer invalidation or member patch with older data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ephemeral_types::{Guild, Member};

#[derive(Default)]
struct Entry {
    generation: u64,
    snapshot: Option<Arc<Guild>>,
}

/// Opaque token returned by [`SnapshotCache::begin_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generation(u64);

#[derive(Default)]
pub(crate) struct SnapshotCache {
    entries: Mutex<HashMap<u64, Entry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<Guild>> {
        self.lock()
            .get(&guild_id)
            .and_then(|entry| entry.snapshot.clone())
    }

    pub fn begin_refresh(&self, guild_id: u64) -> Generation {
        Generation(self.lock().entry(guild_id).or_default().generation)
    }

    /// Publish a refreshed snapshot. Returns false if a write raced the refresh.
    pub fn publish(&self, generation: Generation, guild: Arc<Guild>) -> bool {
        let mut entries = self.lock();
        let entry = entries.entry(guild.id).or_default();
        if entry.generation != generation.0 {
            return false;
        }
        entry.snapshot = Some(guild);
        true
    }

    pub fn invalidate(&self, guild_id: u64) {
        let mut entries = self.lock();
        let entry = entries.entry(guild_id).or_default();
        entry.generation += 1;
        entry.snapshot = None;
    }

    /// Apply `patch` to a cached member in place. No-op if the guild or
    /// member is not cached; the generation is bumped either way.
    pub fn patch_member(&self, guild_id: u64, user_id: u64, patch: impl FnOnce(&mut Member)) {
        let mut entries = self.lock();
        let entry = entries.entry(guild_id).or_default();
        entry.generation += 1;
        if let Some(snapshot) = entry.snapshot.as_mut() {
            if let Some(member) = Arc::make_mut(snapshot).member_mut(user_id) {
                patch(member);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.snapshot.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild(id: u64) -> Arc<Guild> {
        Arc::new(Guild {
            id,
            name: format!("guild-{id}"),
            owner_id: 1,
            roles: Vec::new(),
            channels: Vec::new(),
            members: vec![Member {
                user_id: 7,
                username: "alice".to_string(),
                bot: false,
                roles: vec![1],
            }],
        })
    }

    #[test]
    fn test_publish_then_get() {
        let cache = SnapshotCache::new();
        let generation = cache.begin_refresh(1);
        assert!(cache.publish(generation, guild(1)));
        assert_eq!(cache.get(1).unwrap().name, "guild-1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_removes_snapshot() {
        let cache = SnapshotCache::new();
        let generation = cache.begin_refresh(1);
        cache.publish(generation, guild(1));
        cache.invalidate(1);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_stale_refresh_is_not_published() {
        let cache = SnapshotCache::new();
        let generation = cache.begin_refresh(1);
        cache.invalidate(1);
        assert!(!cache.publish(generation, guild(1)));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_patch_member_copies_on_write() {
        let cache = SnapshotCache::new();
        let generation = cache.begin_refresh(1);
        cache.publish(generation, guild(1));
        let before = cache.get(1).unwrap();

        cache.patch_member(1, 7, |m| m.roles.push(2));

        assert_eq!(before.member(7).unwrap().roles, vec![1]);
        assert_eq!(cache.get(1).unwrap().member(7).unwrap().roles, vec![1, 2]);
    }

    #[test]
    fn test_patch_member_invalidates_in_flight_refresh() {
        let cache = SnapshotCache::new();
        let generation = cache.begin_refresh(1);
        cache.patch_member(1, 7, |m| m.roles.clear());
        assert!(!cache.publish(generation, guild(1)));
    }
}
