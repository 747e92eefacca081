//! Keyed entity table with display order
//!
//! Every write stamps the entity with a fresh value from a store-wide
//! clock. The optimistic engine compares those stamps to decide whether a
//! rollback would overwrite something newer.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use super::pagination::Pagination;
use super::Entity;

/// Removals remembered per store before the oldest are forgotten
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 1024;

/// Canonical in-memory copy of one list of entities
#[derive(Debug, Clone)]
pub struct EntityStore<E: Entity> {
    /// Entities by id
    entities: HashMap<String, E>,
    /// Display order (insertion order, head first)
    order: Vec<String>,
    /// Ids with an optimistic mutation awaiting the server
    pending: HashSet<String>,
    /// Clock value at which an id last left the set
    tombstones: HashMap<String, u64>,
    /// Removals oldest first; entries superseded since are skipped on eviction
    removal_log: VecDeque<(String, u64)>,
    tombstone_limit: usize,
    /// "Load more" cursor
    pagination: Pagination,
    /// Monotonic version clock
    clock: u64,
}

impl<E: Entity> Default for EntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }

    pub fn with_tombstone_limit(tombstone_limit: usize) -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
            pending: HashSet::new(),
            tombstones: HashMap::new(),
            removal_log: VecDeque::new(),
            tombstone_limit,
            pagination: Pagination::default(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Stamp a tombstone and forget the oldest ones past the limit. Ids
    /// with a removal still awaiting the server keep theirs.
    fn record_removal(&mut self, id: &str, version: u64) {
        self.tombstones.insert(id.to_string(), version);
        self.removal_log.push_back((id.to_string(), version));

        let mut budget = self.removal_log.len();
        while self.removal_log.len() > self.tombstone_limit && budget > 0 {
            budget -= 1;
            let Some((oldest, at)) = self.removal_log.pop_front() else {
                break;
            };
            if self.tombstones.get(&oldest) != Some(&at) {
                continue;
            }
            if self.pending.contains(&oldest) {
                self.removal_log.push_back((oldest, at));
                continue;
            }
            self.tombstones.remove(&oldest);
            trace!(entity_id = %oldest, "Tombstone evicted");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Display position of an id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|existing| existing == id)
    }

    /// Entities in display order
    pub fn items(&self) -> impl Iterator<Item = &E> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Cloned read projection of the entities matching `predicate`
    pub fn list<P>(&self, predicate: P) -> Vec<E>
    where
        P: Fn(&E) -> bool,
    {
        self.items().filter(|e| predicate(e)).cloned().collect()
    }

    /// Cloned read projection of the whole list
    pub fn snapshot(&self) -> Vec<E> {
        self.items().cloned().collect()
    }

    /// Ids in display order
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Clock value of the latest removal of `id`, if it is currently absent
    pub fn removal_version(&self, id: &str) -> Option<u64> {
        if self.entities.contains_key(id) {
            return None;
        }
        self.tombstones.get(id).copied()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Current load generation; see [`invalidate_loads`](Self::invalidate_loads)
    pub fn load_generation(&self) -> u64 {
        self.pagination.generation()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or replace by id. Replacing keeps the display position; new
    /// ids go to the tail. Returns the stamped version.
    pub fn upsert(&mut self, mut entity: E) -> u64 {
        let version = self.tick();
        entity.set_version(version);
        let id = entity.id().to_string();

        if !self.entities.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.tombstones.remove(&id);
        self.entities.insert(id, entity);
        version
    }

    /// Mutate an existing entity in place. Returns the new version, or
    /// `None` if the id is not present (nothing is inserted).
    pub fn update<F>(&mut self, id: &str, f: F) -> Option<u64>
    where
        F: FnOnce(&mut E),
    {
        if !self.entities.contains_key(id) {
            return None;
        }
        let version = self.tick();
        let entity = self.entities.get_mut(id)?;
        f(entity);
        entity.set_version(version);
        Some(version)
    }

    /// Remove by id. Idempotent for the visible set; a repeated removal of
    /// an id already gone still advances its tombstone so older snapshots
    /// cannot bring it back.
    pub fn remove(&mut self, id: &str) -> Option<E> {
        let removed = self.entities.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
            self.pending.remove(id);
            let version = self.tick();
            self.record_removal(id, version);
        } else if self.tombstones.contains_key(id) {
            let version = self.tick();
            self.record_removal(id, version);
        }
        removed
    }

    /// Drop the tombstone of `id` so an authoritative re-add can go through
    pub fn forget_removal(&mut self, id: &str) {
        self.tombstones.remove(id);
    }

    /// Reinsert a previously removed entity at its old display position
    pub fn restore(&mut self, mut entity: E, position: usize) -> u64 {
        let version = self.tick();
        entity.set_version(version);
        let id = entity.id().to_string();

        if !self.entities.contains_key(&id) {
            let at = position.min(self.order.len());
            self.order.insert(at, id.clone());
        }
        self.tombstones.remove(&id);
        self.entities.insert(id, entity);
        version
    }

    /// Append a fetched page. Ids already present are refreshed in place
    /// rather than duplicated. Advances the page cursor.
    pub fn append_page(&mut self, items: Vec<E>, has_more: bool) -> usize {
        let mut added = 0;
        for item in items {
            if !self.contains(item.id()) {
                added += 1;
            }
            self.upsert(item);
        }
        self.pagination.finish_load(has_more);
        trace!(added, has_more, total = self.len(), "Appended page");
        added
    }

    /// Put a new entity at the head. Returns `false` (and changes nothing)
    /// if the id is already present or was removed. A replayed creation
    /// must not bring back something deleted since.
    pub fn prepend_one(&mut self, mut item: E) -> bool {
        let id = item.id().to_string();
        if self.entities.contains_key(&id) {
            return false;
        }
        if self.tombstones.contains_key(&id) {
            trace!(entity_id = %id, "Prepend refused for removed id");
            return false;
        }
        let version = self.tick();
        item.set_version(version);
        self.order.insert(0, id.clone());
        self.entities.insert(id, item);
        true
    }

    /// Replace the whole list with a fresh first page. A page repeating an
    /// id keeps the first occurrence.
    pub fn replace_all(&mut self, items: Vec<E>, has_more: bool) {
        let incoming: HashSet<&str> = items.iter().map(Entity::id).collect();
        let removed: Vec<String> = self
            .order
            .iter()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        for id in removed {
            self.remove(&id);
        }
        self.order.clear();
        self.pagination.reset();

        let mut seen = HashSet::new();
        for item in items {
            let id = item.id().to_string();
            if !seen.insert(id.clone()) {
                trace!(entity_id = %id, "Duplicate id in page skipped");
                continue;
            }
            // order follows the page; versions keep counting up
            self.entities.remove(&id);
            self.upsert(item);
        }
        self.pagination.finish_load(has_more);
    }

    pub fn set_pending(&mut self, id: &str, pending: bool) {
        if pending {
            self.pending.insert(id.to_string());
        } else {
            self.pending.remove(id);
        }
    }

    /// Claim the next "load more" fetch
    pub fn begin_load(&mut self) -> Option<u32> {
        self.pagination.begin_load()
    }

    /// Claim a first-page refetch that ends in [`replace_all`](Self::replace_all)
    pub fn begin_reload(&mut self) -> bool {
        self.pagination.begin_reload()
    }

    /// Release a failed fetch
    pub fn abort_load(&mut self) {
        self.pagination.abort_load();
    }

    /// Orphan any fetch in flight (the query changed). Its result must be
    /// dropped by the caller; a new load may start right away.
    pub fn invalidate_loads(&mut self) {
        self.pagination.invalidate();
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.order.clear();
        self.pending.clear();
        self.tombstones.clear();
        self.removal_log.clear();
        self.pagination.reset();
    }
}
