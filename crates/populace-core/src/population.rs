//! Population state machine — drives bulk convergence of actual population
//! toward per-region targets through discrete phases.
//!
//! The machine is global (not per-region). It only decides *what* should
//! happen — the actions it emits are realized by the scheduler's rate-limited
//! queues, so a burst of decisions here never turns into a burst of
//! allocations.

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::region::{RegionId, RegionRegistry};

/// Convergence phase. Created at scheduler initialization, never destroyed —
/// only reset back to `InitialCheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationState {
    /// Measure every region, queue what's missing.
    InitialCheck,
    /// Dwell while queued spawns drain in the background.
    InitialPopulation,
    /// Re-measure; either keep converging or declare the population stable.
    VerificationCheck,
    /// Population is trusted; poll cheaply and trim drift.
    MaintenanceMode,
}

/// A decision emitted by one machine step, realized by the queues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PopulationAction {
    Spawn { region: RegionId, count: u32 },
    Despawn { region: RegionId, count: u32 },
}

/// Subset of the scheduler config the machine consumes.
#[derive(Debug, Clone, Copy)]
pub struct PopulationParams {
    pub check_interval_secs: f64,
    pub initial_settle_secs: f64,
    pub maintenance_interval_secs: f64,
    pub maintenance_interval_reduced_secs: f64,
    pub preserve_excess: bool,
    pub overlap_buffer: f32,
}

impl From<&SchedulerConfig> for PopulationParams {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            check_interval_secs: cfg.check_interval_secs,
            initial_settle_secs: cfg.initial_settle_secs,
            maintenance_interval_secs: cfg.maintenance_interval_secs,
            maintenance_interval_reduced_secs: cfg.maintenance_interval_reduced_secs,
            preserve_excess: cfg.preserve_excess,
            overlap_buffer: cfg.region_overlap_buffer,
        }
    }
}

#[derive(Debug)]
pub struct PopulationStateMachine {
    state: PopulationState,
    entered_at: f64,
    last_poll: f64,
    reduced_polling: bool,
}

impl PopulationStateMachine {
    pub fn new() -> Self {
        Self {
            state: PopulationState::InitialCheck,
            entered_at: 0.0,
            last_poll: f64::NEG_INFINITY,
            reduced_polling: false,
        }
    }

    pub fn state(&self) -> PopulationState {
        self.state
    }

    /// Whether maintenance polling is on the cheaper interval. True while
    /// maintenance scans come back clean, false after a scan found drift.
    pub fn reduced_polling(&self) -> bool {
        self.reduced_polling
    }

    /// Restart convergence from scratch. Used by the deactivation sweep,
    /// world teardown, and bulk-loss detection.
    pub fn reset(&mut self, now: f64) {
        self.state = PopulationState::InitialCheck;
        self.entered_at = now;
        self.last_poll = f64::NEG_INFINITY;
        self.reduced_polling = false;
    }

    /// Reset with a logged cause — used when reconciliation detects that the
    /// population model has drifted too far from reality.
    pub fn force_reset(&mut self, now: f64, reason: &str) {
        log::warn!("population machine reset: {}", reason);
        self.reset(now);
    }

    /// Advance the machine if its poll interval has elapsed. Returns the
    /// actions to feed into the queues (possibly none).
    pub fn step(
        &mut self,
        now: f64,
        registry: &RegionRegistry,
        params: &PopulationParams,
    ) -> Vec<PopulationAction> {
        let interval = match self.state {
            PopulationState::MaintenanceMode => {
                if self.reduced_polling {
                    params.maintenance_interval_reduced_secs
                } else {
                    params.maintenance_interval_secs
                }
            }
            _ => params.check_interval_secs,
        };
        if now - self.last_poll < interval {
            return Vec::new();
        }
        self.last_poll = now;

        match self.state {
            PopulationState::InitialCheck => {
                // Surpluses are queued for despawn regardless of which
                // branch is taken next.
                let mut actions = trim_actions(registry, params);
                let spawns = spawn_actions(registry);
                if spawns.is_empty() {
                    self.state = PopulationState::VerificationCheck;
                } else {
                    actions.extend(spawns);
                    self.enter(PopulationState::InitialPopulation, now);
                }
                actions
            }
            PopulationState::InitialPopulation => {
                // Pure dwell: queue draining continues in the background.
                if now - self.entered_at >= params.initial_settle_secs {
                    self.state = PopulationState::VerificationCheck;
                }
                Vec::new()
            }
            PopulationState::VerificationCheck => {
                let mut actions = trim_actions(registry, params);
                let spawns = spawn_actions(registry);
                if spawns.is_empty() {
                    self.state = PopulationState::MaintenanceMode;
                    self.reduced_polling = true;
                    log::info!("population stable, switching to reduced maintenance polling");
                } else {
                    actions.extend(spawns);
                    self.enter(PopulationState::InitialPopulation, now);
                }
                actions
            }
            PopulationState::MaintenanceMode => {
                if registry.iter().any(|(_, r)| r.deficit() > 0) {
                    // Below target: restart convergence in full.
                    self.reset(now);
                    Vec::new()
                } else {
                    let trims = trim_actions(registry, params);
                    // A scan that had to trim means the population drifted:
                    // watch it at the normal interval until a clean scan.
                    self.reduced_polling = trims.is_empty();
                    trims
                }
            }
        }
    }

    fn enter(&mut self, state: PopulationState, now: f64) {
        self.state = state;
        self.entered_at = now;
    }
}

impl Default for PopulationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_actions(registry: &RegionRegistry) -> Vec<PopulationAction> {
    registry
        .iter()
        .filter(|(_, r)| r.deficit() > 0)
        .map(|(id, r)| PopulationAction::Spawn {
            region: id,
            count: r.deficit(),
        })
        .collect()
}

fn trim_actions(registry: &RegionRegistry, params: &PopulationParams) -> Vec<PopulationAction> {
    if params.preserve_excess {
        return Vec::new();
    }
    registry
        .iter()
        .filter(|(id, r)| {
            // Overlapping regions share coverage; trimming there oscillates.
            r.surplus() > 0 && !registry.overlaps_any(*id, params.overlap_buffer)
        })
        .map(|(id, r)| PopulationAction::Despawn {
            region: id,
            count: r.surplus(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::region::Region;

    fn params() -> PopulationParams {
        PopulationParams {
            check_interval_secs: 1.0,
            initial_settle_secs: 60.0,
            maintenance_interval_secs: 20.0,
            maintenance_interval_reduced_secs: 45.0,
            preserve_excess: false,
            overlap_buffer: 0.0,
        }
    }

    fn registry_with(targets: &[(u32, usize)]) -> (RegionRegistry, hecs::World) {
        // (target, occupants) per region; regions spaced far apart
        let mut arena = hecs::World::new();
        let mut reg = RegionRegistry::new();
        for (i, &(target, occ)) in targets.iter().enumerate() {
            let mut region = Region::new(
                format!("r{}", i),
                Vec3::new(i as f32 * 1000.0, 0.0, 0.0),
                20.0,
                100,
            );
            region.target = target;
            for _ in 0..occ {
                region.occupants.push(arena.spawn(()));
            }
            reg.register(region);
        }
        (reg, arena)
    }

    #[test]
    fn test_initial_check_with_deficit_moves_to_initial_population() {
        let (reg, _arena) = registry_with(&[(4, 0)]);
        let mut m = PopulationStateMachine::new();
        let actions = m.step(0.0, &reg, &params());
        assert_eq!(
            actions,
            vec![PopulationAction::Spawn {
                region: RegionId(0),
                count: 4
            }]
        );
        assert_eq!(m.state(), PopulationState::InitialPopulation);
    }

    #[test]
    fn test_initial_check_without_deficit_skips_to_verification() {
        let (reg, _arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        let actions = m.step(0.0, &reg, &params());
        assert!(actions.is_empty());
        assert_eq!(m.state(), PopulationState::VerificationCheck);
    }

    #[test]
    fn test_initial_check_queues_surplus_despawns_on_both_branches() {
        let (reg, _arena) = registry_with(&[(1, 3), (4, 0)]);
        let mut m = PopulationStateMachine::new();
        let actions = m.step(0.0, &reg, &params());
        assert!(actions.contains(&PopulationAction::Despawn {
            region: RegionId(0),
            count: 2
        }));
        assert!(actions.contains(&PopulationAction::Spawn {
            region: RegionId(1),
            count: 4
        }));
    }

    #[test]
    fn test_initial_population_dwells_for_settle_duration() {
        let (reg, _arena) = registry_with(&[(4, 0)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::InitialPopulation);

        m.step(30.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::InitialPopulation);

        m.step(61.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::VerificationCheck);
    }

    #[test]
    fn test_verification_promotes_and_reduces_polling() {
        let (reg, _arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params()); // InitialCheck -> VerificationCheck
        assert!(!m.reduced_polling());
        m.step(2.0, &reg, &params()); // VerificationCheck -> MaintenanceMode
        assert_eq!(m.state(), PopulationState::MaintenanceMode);
        assert!(m.reduced_polling());
    }

    #[test]
    fn test_verification_with_remaining_deficit_keeps_converging() {
        let (mut reg, mut arena) = registry_with(&[(4, 0)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        // Partially converged by drain in the background
        for _ in 0..2 {
            reg.get_mut(RegionId(0))
                .unwrap()
                .occupants
                .push(arena.spawn(()));
        }
        m.step(61.0, &reg, &params()); // dwell expires
        let actions = m.step(63.0, &reg, &params());
        assert_eq!(
            actions,
            vec![PopulationAction::Spawn {
                region: RegionId(0),
                count: 2
            }]
        );
        assert_eq!(m.state(), PopulationState::InitialPopulation);
    }

    #[test]
    fn test_maintenance_deficit_reverts_to_initial_check() {
        let (mut reg, _arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        m.step(2.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::MaintenanceMode);

        // External loss drops an occupant
        reg.get_mut(RegionId(0)).unwrap().occupants.pop();
        m.step(100.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::InitialCheck);
        assert!(!m.reduced_polling());
    }

    #[test]
    fn test_maintenance_trims_surplus() {
        let (mut reg, mut arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        m.step(2.0, &reg, &params());

        reg.get_mut(RegionId(0))
            .unwrap()
            .occupants
            .push(arena.spawn(()));
        let actions = m.step(100.0, &reg, &params());
        assert_eq!(
            actions,
            vec![PopulationAction::Despawn {
                region: RegionId(0),
                count: 1
            }]
        );
        assert_eq!(m.state(), PopulationState::MaintenanceMode);
    }

    #[test]
    fn test_drift_scan_restores_normal_polling() {
        let (mut reg, mut arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        m.step(2.0, &reg, &params());
        assert!(m.reduced_polling());

        // Surplus drift: the trim scan drops back to the normal interval
        reg.get_mut(RegionId(0))
            .unwrap()
            .occupants
            .push(arena.spawn(()));
        let actions = m.step(100.0, &reg, &params());
        assert!(!actions.is_empty());
        assert!(!m.reduced_polling());

        // Once the surplus is gone, a clean scan at the normal interval
        // flips back to reduced polling
        reg.get_mut(RegionId(0)).unwrap().occupants.pop();
        let actions = m.step(121.0, &reg, &params());
        assert!(actions.is_empty());
        assert!(m.reduced_polling());
    }

    #[test]
    fn test_poll_interval_gates_steps() {
        let (reg, _arena) = registry_with(&[(4, 0)]);
        let mut m = PopulationStateMachine::new();
        let first = m.step(0.0, &reg, &params());
        assert!(!first.is_empty());
        // Dwell state polls are gated by the check interval
        m.step(0.5, &reg, &params());
        assert_eq!(m.state(), PopulationState::InitialPopulation);
    }

    #[test]
    fn test_preserve_excess_suppresses_trim() {
        let (reg, _arena) = registry_with(&[(1, 3)]);
        let mut p = params();
        p.preserve_excess = true;
        let mut m = PopulationStateMachine::new();
        let actions = m.step(0.0, &reg, &p);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_overlapping_region_trim_suppressed() {
        // Two regions close enough to overlap: surplus in one is kept
        let mut arena = hecs::World::new();
        let mut reg = RegionRegistry::new();
        let mut a = Region::new("a", Vec3::new(0.0, 0.0, 0.0), 30.0, 100);
        a.target = 1;
        for _ in 0..3 {
            a.occupants.push(arena.spawn(()));
        }
        reg.register(a);
        reg.register(Region::new("b", Vec3::new(40.0, 0.0, 0.0), 30.0, 100));

        let mut m = PopulationStateMachine::new();
        let actions = m.step(0.0, &reg, &params());
        assert!(actions
            .iter()
            .all(|a| !matches!(a, PopulationAction::Despawn { .. })));
    }

    #[test]
    fn test_force_reset() {
        let (reg, _arena) = registry_with(&[(2, 2)]);
        let mut m = PopulationStateMachine::new();
        m.step(0.0, &reg, &params());
        m.step(2.0, &reg, &params());
        assert_eq!(m.state(), PopulationState::MaintenanceMode);
        m.force_reset(10.0, "bulk loss");
        assert_eq!(m.state(), PopulationState::InitialCheck);
        assert!(!m.reduced_polling());
    }
}
