//! In-memory world host — a deterministic [`WorldHost`] + [`Navigator`]
//! implementation with no engine behind it.
//!
//! Used by the simtest harness and the test suite to run the scheduler
//! end-to-end: entities are plain records in a map, time is a settable
//! `hhmm` field, and external loss is simulated with [`kill`](HeadlessWorld::kill).

use std::collections::HashMap;

use crate::geometry::Vec3;
use crate::world::{EntityHandle, Navigator, PrefabHandle, RouteId, WorldHost};

#[derive(Debug, Clone, Copy)]
struct HeadlessEntity {
    position: Vec3,
    active: bool,
}

/// A world that exists only in memory.
#[derive(Debug, Default)]
pub struct HeadlessWorld {
    next_id: u64,
    entities: HashMap<u64, HeadlessEntity>,

    /// Time of day in `hhmm` encoding, settable by the driver.
    pub sim_time: i32,
    /// Simulated player position.
    pub player: Option<Vec3>,
    /// When true, the host reports a streaming spike.
    pub streaming_busy: bool,
    /// When true, the nav-mesh probe finds nothing.
    pub deny_walkable: bool,
    /// When true, instantiation fails (world not ready).
    pub fail_instantiate: bool,
    /// When true, prefab lookup fails.
    pub prefab_missing: bool,

    warps: u32,
    destroyed: u32,
    replicated: u32,
}

impl HeadlessWorld {
    pub fn new() -> Self {
        Self {
            sim_time: 1200,
            ..Self::default()
        }
    }

    /// Create a live, active entity directly — bypasses the prefab path.
    pub fn spawn_raw(&mut self, position: Vec3) -> EntityHandle {
        self.next_id += 1;
        self.entities.insert(
            self.next_id,
            HeadlessEntity {
                position,
                active: true,
            },
        );
        EntityHandle(self.next_id)
    }

    /// Remove an entity through a channel the scheduler does not own,
    /// simulating externally-caused population loss.
    pub fn kill(&mut self, entity: EntityHandle) {
        self.entities.remove(&entity.0);
    }

    /// Remove up to `n` entities in ascending id order, simulating bulk
    /// external loss.
    pub fn kill_many(&mut self, n: usize) -> usize {
        let mut ids: Vec<u64> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        let killed = ids.len().min(n);
        for id in &ids[..killed] {
            self.entities.remove(id);
        }
        killed
    }

    /// Nudge every active entity, simulating patrol movement so the stuck
    /// detector sees progress.
    pub fn drift(&mut self, amount: f32) {
        for e in self.entities.values_mut() {
            if e.active {
                e.position.x += amount;
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.entities.len()
    }

    pub fn active_count(&self) -> usize {
        self.entities.values().filter(|e| e.active).count()
    }

    pub fn warp_count(&self) -> u32 {
        self.warps
    }

    pub fn destroyed_count(&self) -> u32 {
        self.destroyed
    }

    pub fn replicated_count(&self) -> u32 {
        self.replicated
    }
}

impl WorldHost for HeadlessWorld {
    fn find_prefab(&self, type_id: u32) -> Option<PrefabHandle> {
        if self.prefab_missing {
            None
        } else {
            Some(PrefabHandle(u64::from(type_id)))
        }
    }

    fn instantiate(
        &mut self,
        _prefab: PrefabHandle,
        position: Vec3,
        _heading: f32,
    ) -> Option<EntityHandle> {
        if self.fail_instantiate {
            return None;
        }
        self.next_id += 1;
        self.entities.insert(
            self.next_id,
            HeadlessEntity {
                position,
                active: false,
            },
        );
        Some(EntityHandle(self.next_id))
    }

    fn activate(&mut self, entity: EntityHandle) {
        if let Some(e) = self.entities.get_mut(&entity.0) {
            e.active = true;
        }
    }

    fn deactivate(&mut self, entity: EntityHandle) {
        if let Some(e) = self.entities.get_mut(&entity.0) {
            e.active = false;
        }
    }

    fn destroy(&mut self, entity: EntityHandle) {
        if self.entities.remove(&entity.0).is_some() {
            self.destroyed += 1;
        }
    }

    fn is_live(&self, entity: EntityHandle) -> bool {
        self.entities.contains_key(&entity.0)
    }

    fn position_of(&self, entity: EntityHandle) -> Option<Vec3> {
        self.entities.get(&entity.0).map(|e| e.position)
    }

    fn replicate(&mut self, _entity: EntityHandle) {
        self.replicated += 1;
    }

    fn sample_walkable(&self, near: Vec3, _search_radius: f32) -> Option<Vec3> {
        if self.deny_walkable {
            None
        } else {
            Some(near + Vec3::new(1.0, 0.0, 1.0))
        }
    }

    fn current_sim_time(&self) -> i32 {
        self.sim_time
    }

    fn player_position(&self) -> Option<Vec3> {
        self.player
    }

    fn is_streaming_busy(&self) -> bool {
        self.streaming_busy
    }
}

impl Navigator for HeadlessWorld {
    fn set_speed(&mut self, _entity: EntityHandle, _speed: f32) {}

    fn set_acceleration(&mut self, _entity: EntityHandle, _acceleration: f32) {}

    fn warp(&mut self, entity: EntityHandle, position: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity.0) {
            e.position = position;
            self.warps += 1;
        }
    }

    fn restart_patrol(&mut self, _entity: EntityHandle, _route: RouteId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_and_lifecycle() {
        let mut w = HeadlessWorld::new();
        let prefab = w.find_prefab(0).unwrap();
        let e = w.instantiate(prefab, Vec3::new(1.0, 0.0, 1.0), 0.0).unwrap();
        assert!(w.is_live(e));
        assert_eq!(w.active_count(), 0);

        w.activate(e);
        assert_eq!(w.active_count(), 1);

        w.destroy(e);
        assert!(!w.is_live(e));
        assert_eq!(w.destroyed_count(), 1);
    }

    #[test]
    fn test_kill_simulates_external_loss() {
        let mut w = HeadlessWorld::new();
        let e = w.spawn_raw(Vec3::ZERO);
        w.kill(e);
        assert!(!w.is_live(e));
        // External loss is not a scheduler-owned destroy
        assert_eq!(w.destroyed_count(), 0);
    }

    #[test]
    fn test_drift_moves_active_entities() {
        let mut w = HeadlessWorld::new();
        let e = w.spawn_raw(Vec3::ZERO);
        w.drift(2.0);
        assert_eq!(w.position_of(e).unwrap().x, 2.0);
    }

    #[test]
    fn test_failure_toggles() {
        let mut w = HeadlessWorld::new();
        w.prefab_missing = true;
        assert!(w.find_prefab(0).is_none());
        w.prefab_missing = false;
        w.fail_instantiate = true;
        let prefab = w.find_prefab(0).unwrap();
        assert!(w.instantiate(prefab, Vec3::ZERO, 0.0).is_none());
    }
}
