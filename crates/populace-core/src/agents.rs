//! Agent record components.
//!
//! Scheduling metadata lives in a `hecs` arena, addressed by stable entity
//! ids rather than keyed by live world-object identity. The world entity
//! itself is owned by the host; the record only carries the handle and the
//! scheduler's own bookkeeping.

use crate::geometry::Vec3;
use crate::region::RegionId;
use crate::world::{EntityHandle, RouteId};

/// Pool membership state of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Live in the world, counted against a region's target.
    Active,
    /// Deactivated and held for reuse.
    Pooled,
}

/// Scheduler-owned metadata for one agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Handle to the host-owned world entity. May go dead at any time.
    pub handle: EntityHandle,
    /// Region whose occupant list holds this agent, if any.
    pub region: Option<RegionId>,
    /// Patrol route the agent walks.
    pub route: RouteId,
    pub phase: AgentPhase,
}

/// Position-progress sampling state, present only while an agent is active.
#[derive(Debug, Clone)]
pub struct StuckTracker {
    pub last_pos: Vec3,
    /// Consecutive samples with movement below epsilon.
    pub stall_count: u32,
    /// In-place repositions performed so far; above the recovery cap the
    /// agent is replaced instead.
    pub recoveries: u32,
}

impl StuckTracker {
    pub fn new(pos: Vec3) -> Self {
        Self {
            last_pos: pos,
            stall_count: 0,
            recoveries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_record_round_trip_in_arena() {
        let mut arena = hecs::World::new();
        let e = arena.spawn((
            AgentRecord {
                handle: EntityHandle(7),
                region: Some(RegionId(0)),
                route: RouteId(3),
                phase: AgentPhase::Active,
            },
            StuckTracker::new(Vec3::new(1.0, 0.0, 1.0)),
        ));

        {
            let rec = arena.get::<&AgentRecord>(e).unwrap();
            assert_eq!(rec.handle, EntityHandle(7));
            assert_eq!(rec.phase, AgentPhase::Active);
        }

        arena.get::<&mut StuckTracker>(e).unwrap().stall_count += 1;
        assert_eq!(arena.get::<&StuckTracker>(e).unwrap().stall_count, 1);

        arena.despawn(e).unwrap();
        assert!(!arena.contains(e));
    }
}
