//! External collaborator boundary — the traits the scheduler is built against.
//!
//! The scheduler never reaches for a global service locator: it is constructed
//! with a [`WorldHost`] implementation and drives every physical-entity
//! operation through it. The host exclusively owns the physical entities;
//! the scheduler only holds [`EntityHandle`]s and must treat "handle refers to
//! a no-longer-live entity" as a normal, constantly-checked condition.

use crate::geometry::Vec3;
use serde::{Deserialize, Serialize};

/// Opaque handle to a world entity owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

/// Opaque handle to a spawnable entity template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefabHandle(pub u64);

/// Opaque id of a patrol-route resource. Route geometry generation is not the
/// scheduler's business; it only associates routes with agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub u32);

/// Wall-clock time of day decoded from the host's `hhmm` integer encoding
/// (e.g. `1930` = 19:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl SimClockTime {
    /// Decode from the host's integer encoding. Out-of-range values are
    /// clamped to a valid time rather than rejected.
    pub fn from_hhmm(raw: i32) -> Self {
        let raw = raw.max(0) as u32;
        Self {
            hour: (raw / 100).min(23),
            minute: (raw % 100).min(59),
        }
    }

    /// Minutes since midnight, in `0..1440`.
    pub fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// Everything the scheduler consumes from the host simulation.
///
/// Implemented by an adapter over the real engine, or by
/// [`HeadlessWorld`](crate::headless::HeadlessWorld) for tests and harnesses.
pub trait WorldHost {
    /// Look up the spawnable template for an agent type.
    fn find_prefab(&self, type_id: u32) -> Option<PrefabHandle>;

    /// Create a physical entity. `None` means the world is not ready to
    /// allocate right now — a transient failure, retried on a later cycle.
    fn instantiate(
        &mut self,
        prefab: PrefabHandle,
        position: Vec3,
        heading: f32,
    ) -> Option<EntityHandle>;

    fn activate(&mut self, entity: EntityHandle);
    fn deactivate(&mut self, entity: EntityHandle);
    fn destroy(&mut self, entity: EntityHandle);

    /// Whether the handle still refers to a live entity. The scheduler calls
    /// this constantly; hosts should keep it cheap.
    fn is_live(&self, entity: EntityHandle) -> bool;

    /// Current position of a live entity, `None` if the handle is dead.
    fn position_of(&self, entity: EntityHandle) -> Option<Vec3>;

    /// Replicate a freshly spawned entity to other session participants.
    fn replicate(&mut self, entity: EntityHandle);

    /// Navigation-mesh probe: nearest walkable position within
    /// `search_radius` of `near`, or `None` if nothing valid is found.
    fn sample_walkable(&self, near: Vec3, search_radius: f32) -> Option<Vec3>;

    /// Current time of day in the host's `hhmm` integer encoding.
    fn current_sim_time(&self) -> i32;

    /// Player position, `None` when no player is present.
    fn player_position(&self) -> Option<Vec3>;

    /// Whether the host is currently busy streaming/allocating elsewhere.
    /// Spawn drains back off for a cooldown while this reports true.
    fn is_streaming_busy(&self) -> bool;
}

/// Typed movement capability, keyed by entity handle.
///
/// Replaces reflective pokes at a third-party movement component with an
/// explicit interface implemented by an adapter over the real thing.
pub trait Navigator {
    fn set_speed(&mut self, entity: EntityHandle, speed: f32);
    fn set_acceleration(&mut self, entity: EntityHandle, acceleration: f32);

    /// Teleport the entity, bypassing steering.
    fn warp(&mut self, entity: EntityHandle, position: Vec3);

    /// Restart the agent's patrol along its assigned route.
    fn restart_patrol(&mut self, entity: EntityHandle, route: RouteId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_clock_decode() {
        let t = SimClockTime::from_hhmm(1930);
        assert_eq!(t.hour, 19);
        assert_eq!(t.minute, 30);
        assert_eq!(t.minutes_of_day(), 19 * 60 + 30);
    }

    #[test]
    fn test_sim_clock_decode_clamps() {
        let t = SimClockTime::from_hhmm(-5);
        assert_eq!(t.minutes_of_day(), 0);

        let t = SimClockTime::from_hhmm(2975);
        assert_eq!(t.hour, 23);
        assert_eq!(t.minute, 59);
    }

    #[test]
    fn test_sim_clock_midnight() {
        let t = SimClockTime::from_hhmm(0);
        assert_eq!(t.minutes_of_day(), 0);
    }
}
