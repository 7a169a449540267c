//! Entity pool — recycles despawned agents instead of destroying them.
//!
//! Reactivating a pooled agent is much cheaper than a fresh host allocation,
//! so the spawn path checks here first. Capacity is fixed; entries past the
//! TTL are evicted oldest-first and are never reactivated.

use std::collections::VecDeque;

/// One pooled agent record, tagged with its pool-entry time.
#[derive(Debug, Clone, Copy)]
pub struct PooledEntry {
    pub agent: hecs::Entity,
    pub pooled_at: f64,
}

/// FIFO holding area for deactivated agents awaiting reuse.
#[derive(Debug)]
pub struct EntityPool {
    entries: VecDeque<PooledEntry>,
    capacity: usize,
    ttl_secs: f64,
}

impl EntityPool {
    pub fn new(capacity: usize, ttl_secs: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            ttl_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Admit an agent for reuse. Fails when the pool is at capacity; the
    /// caller then destroys the agent instead.
    pub fn try_admit(&mut self, agent: hecs::Entity, now: f64) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push_back(PooledEntry {
            agent,
            pooled_at: now,
        });
        true
    }

    /// Pop the oldest entry still within the TTL, if any. Call
    /// [`take_expired`](Self::take_expired) first so stale entries can't be
    /// handed out.
    pub fn take_fresh(&mut self, now: f64) -> Option<hecs::Entity> {
        while let Some(front) = self.entries.front() {
            if now - front.pooled_at > self.ttl_secs {
                // Shouldn't be reachable after take_expired, but a stale
                // entry must never be reactivated.
                self.entries.pop_front();
                continue;
            }
            return self.entries.pop_front().map(|e| e.agent);
        }
        None
    }

    /// Remove entries past the TTL, oldest first. The caller destroys the
    /// returned agents.
    pub fn take_expired(&mut self, now: f64) -> Vec<hecs::Entity> {
        let mut expired = Vec::new();
        while let Some(front) = self.entries.front() {
            if now - front.pooled_at > self.ttl_secs {
                if let Some(e) = self.entries.pop_front() {
                    expired.push(e.agent);
                }
            } else {
                break;
            }
        }
        expired
    }

    /// Empty the pool, returning everything. Used by the full teardown path.
    pub fn drain_all(&mut self) -> Vec<hecs::Entity> {
        self.entries.drain(..).map(|e| e.agent).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_entities(n: usize) -> (hecs::World, Vec<hecs::Entity>) {
        let mut arena = hecs::World::new();
        let entities = (0..n).map(|_| arena.spawn(())).collect();
        (arena, entities)
    }

    #[test]
    fn test_capacity_is_enforced() {
        let (_arena, e) = arena_entities(3);
        let mut pool = EntityPool::new(2, 100.0);
        assert!(pool.try_admit(e[0], 0.0));
        assert!(pool.try_admit(e[1], 0.0));
        assert!(!pool.try_admit(e[2], 0.0));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_fifo_reuse_order() {
        let (_arena, e) = arena_entities(2);
        let mut pool = EntityPool::new(4, 100.0);
        pool.try_admit(e[0], 0.0);
        pool.try_admit(e[1], 1.0);
        assert_eq!(pool.take_fresh(2.0), Some(e[0]));
        assert_eq!(pool.take_fresh(2.0), Some(e[1]));
        assert_eq!(pool.take_fresh(2.0), None);
    }

    #[test]
    fn test_expired_entry_never_reactivated() {
        let (_arena, e) = arena_entities(2);
        let mut pool = EntityPool::new(4, 10.0);
        pool.try_admit(e[0], 0.0);
        pool.try_admit(e[1], 8.0);

        let expired = pool.take_expired(15.0);
        assert_eq!(expired, vec![e[0]]);
        // The survivor is still fresh
        assert_eq!(pool.take_fresh(15.0), Some(e[1]));
    }

    #[test]
    fn test_take_fresh_skips_stale_front() {
        let (_arena, e) = arena_entities(2);
        let mut pool = EntityPool::new(4, 10.0);
        pool.try_admit(e[0], 0.0);
        pool.try_admit(e[1], 20.0);
        // Without an eviction pass first, take_fresh still refuses the
        // stale front entry.
        assert_eq!(pool.take_fresh(25.0), Some(e[1]));
    }

    #[test]
    fn test_drain_all() {
        let (_arena, e) = arena_entities(2);
        let mut pool = EntityPool::new(4, 10.0);
        pool.try_admit(e[0], 0.0);
        pool.try_admit(e[1], 0.0);
        assert_eq!(pool.drain_all().len(), 2);
        assert!(pool.is_empty());
    }
}
