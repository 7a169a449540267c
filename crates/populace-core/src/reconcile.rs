//! Reconciliation — re-validates region bookkeeping against the live world.
//!
//! Agents can disappear through channels the scheduler does not own. This
//! pass removes occupant entries whose handles no longer refer to live
//! entities so the next population check sees the real deficit. Drift is
//! logged as a count, never treated as fatal.

use crate::agents::{AgentPhase, AgentRecord};
use crate::region::RegionRegistry;
use crate::world::WorldHost;

/// Drop dead occupant entries everywhere; returns how many were removed.
///
/// A large return value while the state machine is in maintenance mode means
/// the population model can no longer be trusted — the caller reacts by
/// forcing a full convergence restart.
pub fn run_reconcile_pass<W: WorldHost>(
    arena: &mut hecs::World,
    registry: &mut RegionRegistry,
    host: &W,
) -> usize {
    let mut dead = Vec::new();

    for (_, region) in registry.iter_mut() {
        region.occupants.retain(|&entity| {
            let live = match arena.get::<&AgentRecord>(entity) {
                Ok(record) => record.phase == AgentPhase::Active && host.is_live(record.handle),
                Err(_) => false,
            };
            if !live {
                dead.push(entity);
            }
            live
        });
    }

    let removed = dead.len();
    for entity in dead {
        // The record is pure scheduler metadata; the world entity is already
        // gone, so the whole record goes with it.
        let _ = arena.despawn(entity);
    }

    if removed > 0 {
        log::info!("reconciliation removed {} dead occupant entries", removed);
    }
    removed
}
