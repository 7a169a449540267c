//! Stuck detection — finds agents that stopped making progress and recovers
//! them in place or replaces them.
//!
//! Runs on its own slow cadence. Movement below a small epsilon between
//! samples increments a per-agent stall counter; at the threshold the agent
//! is warped to a nearby walkable position and its patrol restarted. When no
//! valid position exists, or the agent has already been repositioned too many
//! times, it is despawned and a replacement is queued in the same region.

use crate::agents::{AgentPhase, AgentRecord, StuckTracker};
use crate::config::SchedulerConfig;
use crate::queue::{DespawnJob, DespawnQueue, SpawnJob, SpawnQueue};
use crate::region::RegionRegistry;
use crate::world::{Navigator, WorldHost};

/// Replacements jump the spawn queue ahead of routine top-ups.
pub const REPLACEMENT_PRIORITY: f32 = 10.0;

/// Counts from one detector pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct StuckPassOutcome {
    pub repositioned: u32,
    pub replaced: u32,
    pub purged: u32,
}

/// Sample every active agent once and recover the stuck ones.
pub fn run_stuck_pass<H: WorldHost + Navigator>(
    arena: &mut hecs::World,
    registry: &RegionRegistry,
    host: &mut H,
    spawn_queue: &mut SpawnQueue,
    despawn_queue: &mut DespawnQueue,
    cfg: &SchedulerConfig,
    now: f64,
) -> StuckPassOutcome {
    let mut outcome = StuckPassOutcome::default();
    let mut dead = Vec::new();
    let mut replace = Vec::new();

    for (entity, (record, tracker)) in arena.query::<(&AgentRecord, &mut StuckTracker)>().iter() {
        if record.phase != AgentPhase::Active {
            continue;
        }
        if despawn_queue.contains(entity) {
            // Already on the way out; don't fight the despawn path.
            continue;
        }
        let pos = match host.position_of(record.handle) {
            Some(p) if host.is_live(record.handle) => p,
            _ => {
                dead.push(entity);
                continue;
            }
        };

        if pos.distance(&tracker.last_pos) < cfg.stuck_epsilon {
            tracker.stall_count += 1;
        } else {
            tracker.stall_count = 0;
        }
        tracker.last_pos = pos;

        if tracker.stall_count < cfg.stuck_threshold {
            continue;
        }
        // One recovery attempt per detection, then the counter restarts.
        tracker.stall_count = 0;

        let recovered = tracker.recoveries < cfg.stuck_recovery_cap
            && match host.sample_walkable(pos, cfg.stuck_search_radius) {
                Some(target) => {
                    host.warp(record.handle, target);
                    host.restart_patrol(record.handle, record.route);
                    tracker.last_pos = target;
                    tracker.recoveries += 1;
                    true
                }
                None => false,
            };

        if recovered {
            outcome.repositioned += 1;
        } else {
            replace.push((entity, record.region));
        }
    }

    for (entity, region_id) in replace {
        if !despawn_queue.enqueue(DespawnJob {
            agent: entity,
            region: region_id,
            enqueued_at: now,
        }) {
            continue;
        }
        outcome.replaced += 1;

        let Some(region_id) = region_id else { continue };
        let Some(region) = registry.get(region_id) else {
            continue;
        };
        // The outgoing agent still sits in the occupant list, so count
        // effective occupancy net of everything already queued to leave.
        let effective = region
            .occupants
            .iter()
            .filter(|e| !despawn_queue.contains(**e))
            .count();
        let anchor = region.anchors.first().copied().unwrap_or(region.center);
        spawn_queue.enqueue(
            SpawnJob {
                region: region_id,
                anchor,
                priority: REPLACEMENT_PRIORITY,
                enqueued_at: now,
            },
            effective,
            region.target,
        );
    }

    for entity in dead {
        let _ = arena.remove_one::<StuckTracker>(entity);
        outcome.purged += 1;
    }

    if outcome.replaced > 0 || outcome.repositioned > 0 {
        log::debug!(
            "stuck pass: {} repositioned, {} replaced, {} purged",
            outcome.repositioned,
            outcome.replaced,
            outcome.purged
        );
    }
    outcome
}
