//! Scheduler orchestrator — the per-frame tick entry point.
//!
//! Owns the region registry, agent arena, queues, pool, clock, and state
//! machine, and sequences them inside a single cooperative `tick()` call.
//! Every subsystem is rate-limited by tick-count or elapsed-time checks; the
//! only cross-tick coupling is the single-spawn in-flight gate, a deferred
//! continuation scheduled against the tick counter.

use rand::Rng;
use serde::Serialize;

use crate::agents::{AgentPhase, AgentRecord, StuckTracker};
use crate::clock::{ActivityWindowClock, Tier, Transition};
use crate::config::{ConfigError, SchedulerConfig};
use crate::geometry::Vec3;
use crate::pool::EntityPool;
use crate::population::{PopulationAction, PopulationParams, PopulationState, PopulationStateMachine};
use crate::queue::{DespawnJob, DespawnQueue, SpawnJob, SpawnQueue};
use crate::reconcile::run_reconcile_pass;
use crate::region::{Region, RegionId, RegionRegistry};
use crate::stuck::run_stuck_pass;
use crate::world::{Navigator, RouteId, SimClockTime, WorldHost};

/// Base priority for routine top-up spawns.
const BASE_SPAWN_PRIORITY: f32 = 1.0;
/// Priority boost for regions the player visited recently.
const VISITED_PRIORITY_BOOST: f32 = 1.0;

/// Phase of the single spawn allowed in flight at a time.
#[derive(Debug, Clone, Copy)]
enum SpawnPhase {
    /// Dequeued; realization deferred so the current tick finishes first.
    Deferred { realize_at: u64 },
    /// Realized; the gate stays held while the host settles the new entity.
    Settling { release_at: u64 },
}

#[derive(Debug, Clone, Copy)]
struct InFlightSpawn {
    job: SpawnJob,
    phase: SpawnPhase,
}

enum SpawnResult {
    Spawned,
    /// Job became unnecessary between dequeue and realization.
    Skipped,
    /// Transient host failure; the deficit remains and will be re-queued.
    Failed,
}

/// Counters exposed to the host for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub tick: u64,
    pub state: PopulationState,
    pub active_agents: usize,
    pub pooled_agents: usize,
    pub spawn_queue_depth: usize,
    pub despawn_queue_depth: usize,
    pub total_occupancy: usize,
    pub spawned_total: u64,
    pub despawned_total: u64,
    pub drift_removed_total: u64,
    pub stuck_repositioned_total: u64,
    pub stuck_replaced_total: u64,
}

/// The agent population scheduler. Constructed with the world collaborator
/// it drives; nothing is reached through globals.
pub struct PopulationScheduler<H: WorldHost + Navigator> {
    host: H,
    cfg: SchedulerConfig,
    registry: RegionRegistry,
    arena: hecs::World,
    spawn_queue: SpawnQueue,
    despawn_queue: DespawnQueue,
    pool: EntityPool,
    clock: ActivityWindowClock,
    machine: PopulationStateMachine,

    tick_count: u64,
    elapsed: f64,
    initialized: bool,
    current_tier: Option<Tier>,

    in_flight: Option<InFlightSpawn>,
    last_spawn_drain_tick: u64,
    streaming_hold_until: f64,
    spawn_failures: u32,

    last_stuck_pass: f64,
    last_reconcile_pass: f64,

    spawned_total: u64,
    despawned_total: u64,
    drift_removed_total: u64,
    stuck_repositioned_total: u64,
    stuck_replaced_total: u64,
}

impl<H: WorldHost + Navigator> PopulationScheduler<H> {
    pub fn new(host: H, cfg: SchedulerConfig) -> Self {
        let pool = EntityPool::new(cfg.pool_capacity, cfg.pool_ttl_secs);
        let clock = ActivityWindowClock::new(
            cfg.active_start_minutes,
            cfg.active_end_minutes,
            cfg.time_jump_threshold_minutes,
        );
        Self {
            host,
            cfg,
            registry: RegionRegistry::new(),
            arena: hecs::World::new(),
            spawn_queue: SpawnQueue::new(),
            despawn_queue: DespawnQueue::new(),
            pool,
            clock,
            machine: PopulationStateMachine::new(),
            tick_count: 0,
            elapsed: 0.0,
            initialized: false,
            current_tier: None,
            in_flight: None,
            last_spawn_drain_tick: 0,
            streaming_hold_until: 0.0,
            spawn_failures: 0,
            last_stuck_pass: 0.0,
            last_reconcile_pass: 0.0,
            spawned_total: 0,
            despawned_total: 0,
            drift_removed_total: 0,
            stuck_repositioned_total: 0,
            stuck_replaced_total: 0,
        }
    }

    pub fn add_region(&mut self, region: Region) -> RegionId {
        self.registry.register(region)
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn state(&self) -> PopulationState {
        self.machine.state()
    }

    /// Validate config, compute the current tier's targets, and arm the tick
    /// loop.
    pub fn initialize(&mut self) -> Result<(), ConfigError> {
        self.cfg.validate()?;
        let minutes = self.minutes_of_day();
        self.apply_tier(minutes);
        self.machine.reset(self.elapsed);
        self.initialized = true;
        log::info!(
            "population scheduler initialized: {} region(s), tier {:?}",
            self.registry.len(),
            self.current_tier
        );
        Ok(())
    }

    /// Full teardown. The world's entities are gone with the world; only
    /// scheduler metadata needs clearing here.
    pub fn on_world_unloaded(&mut self) {
        self.spawn_queue.clear();
        self.despawn_queue.clear();
        let _ = self.pool.drain_all();
        self.arena.clear();
        self.registry.clear_occupants();
        self.in_flight = None;
        self.spawn_failures = 0;
        self.machine.reset(self.elapsed);
        self.clock.reset();
        self.initialized = false;
        log::info!("world unloaded: scheduler state cleared");
    }

    /// Re-arm initialization after a world reload.
    pub fn on_world_loaded(&mut self) {
        if let Err(e) = self.initialize() {
            log::error!("scheduler re-initialization failed: {}", e);
        }
    }

    /// The per-frame entry point. Never blocks; does nothing until
    /// [`initialize`](Self::initialize) has succeeded.
    pub fn tick(&mut self, delta_seconds: f32) {
        if !self.initialized {
            return;
        }
        self.tick_count += 1;
        self.elapsed += f64::from(delta_seconds.max(0.0));

        let minutes = self.minutes_of_day();
        match self.clock.observe(minutes) {
            Transition::Deactivated => self.full_despawn_sweep(),
            Transition::Activated | Transition::DayJumped => self.apply_tier(minutes),
            Transition::None => {}
        }

        if self.clock.is_active() {
            let tier = self.clock.current_limit(minutes);
            if self.current_tier != Some(tier) {
                self.apply_tier(minutes);
            }
            if let Some(player) = self.host.player_position() {
                self.registry.mark_visited(player, self.elapsed);
            }
            let params = PopulationParams::from(&self.cfg);
            let actions = self.machine.step(self.elapsed, &self.registry, &params);
            self.apply_actions(actions);
        }

        self.drive_in_flight();
        self.drain_spawn_queue();
        self.drain_despawn_queue();
        self.evict_expired_pool();

        if self.elapsed - self.last_stuck_pass >= self.cfg.stuck_interval_secs {
            self.last_stuck_pass = self.elapsed;
            let outcome = run_stuck_pass(
                &mut self.arena,
                &self.registry,
                &mut self.host,
                &mut self.spawn_queue,
                &mut self.despawn_queue,
                &self.cfg,
                self.elapsed,
            );
            self.stuck_repositioned_total += u64::from(outcome.repositioned);
            self.stuck_replaced_total += u64::from(outcome.replaced);
        }

        if self.elapsed - self.last_reconcile_pass >= self.cfg.reconcile_interval_secs {
            self.last_reconcile_pass = self.elapsed;
            let removed = run_reconcile_pass(&mut self.arena, &mut self.registry, &self.host);
            self.drift_removed_total += removed as u64;
            if removed > self.cfg.bulk_loss_threshold
                && self.machine.state() == PopulationState::MaintenanceMode
            {
                // Incremental correction can't be trusted after bulk loss.
                self.machine
                    .force_reset(self.elapsed, "bulk external loss during maintenance");
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let active_agents = self
            .arena
            .query::<&AgentRecord>()
            .iter()
            .filter(|(_, r)| r.phase == AgentPhase::Active)
            .count();
        SchedulerStats {
            tick: self.tick_count,
            state: self.machine.state(),
            active_agents,
            pooled_agents: self.pool.len(),
            spawn_queue_depth: self.spawn_queue.len(),
            despawn_queue_depth: self.despawn_queue.len(),
            total_occupancy: self.registry.total_occupancy(),
            spawned_total: self.spawned_total,
            despawned_total: self.despawned_total,
            drift_removed_total: self.drift_removed_total,
            stuck_repositioned_total: self.stuck_repositioned_total,
            stuck_replaced_total: self.stuck_replaced_total,
        }
    }

    // ── internal ────────────────────────────────────────────────────────

    fn minutes_of_day(&self) -> u32 {
        SimClockTime::from_hhmm(self.host.current_sim_time()).minutes_of_day()
    }

    fn apply_tier(&mut self, minutes: u32) {
        let tier = self.clock.current_limit(minutes);
        self.current_tier = Some(tier);
        let budget = self.cfg.tier_ceilings.for_tier(tier);
        self.registry.redistribute(budget);
        log::debug!("tier {:?}: redistributed budget {}", tier, budget);
    }

    fn apply_actions(&mut self, actions: Vec<PopulationAction>) {
        let player = self.host.player_position();
        let mut rng = rand::thread_rng();

        for action in actions {
            match action {
                PopulationAction::Spawn { region, count } => {
                    for _ in 0..count {
                        let Some(r) = self.registry.get(region) else {
                            break;
                        };
                        let anchor =
                            choose_anchor(r, player, self.cfg.min_player_distance, &mut rng);
                        let visited_recently = r
                            .last_visited
                            .is_some_and(|t| self.elapsed - t <= self.cfg.visit_boost_secs);
                        let priority = if visited_recently {
                            BASE_SPAWN_PRIORITY + VISITED_PRIORITY_BOOST
                        } else {
                            BASE_SPAWN_PRIORITY
                        };
                        let effective = r
                            .occupants
                            .iter()
                            .filter(|e| !self.despawn_queue.contains(**e))
                            .count();
                        let target = r.target;
                        self.spawn_queue.enqueue(
                            SpawnJob {
                                region,
                                anchor,
                                priority,
                                enqueued_at: self.elapsed,
                            },
                            effective,
                            target,
                        );
                    }
                }
                PopulationAction::Despawn { region, count } => {
                    let Some(r) = self.registry.get(region) else {
                        continue;
                    };
                    // Trim from the tail — the most recently placed agents go
                    // first.
                    let victims: Vec<hecs::Entity> = r
                        .occupants
                        .iter()
                        .rev()
                        .filter(|e| !self.despawn_queue.contains(**e))
                        .take(count as usize)
                        .copied()
                        .collect();
                    for agent in victims {
                        self.despawn_queue.enqueue(DespawnJob {
                            agent,
                            region: Some(region),
                            enqueued_at: self.elapsed,
                        });
                    }
                }
            }
        }
    }

    fn drain_spawn_queue(&mut self) {
        if self.in_flight.is_some() || self.spawn_queue.is_empty() {
            return;
        }
        if self.elapsed < self.streaming_hold_until {
            return;
        }
        if self.host.is_streaming_busy() {
            // Don't contend with an unrelated allocation spike.
            self.streaming_hold_until = self.elapsed + self.cfg.streaming_cooldown_secs;
            return;
        }
        if self.tick_count - self.last_spawn_drain_tick < self.cfg.spawn_throttle_ticks {
            return;
        }
        self.last_spawn_drain_tick = self.tick_count;

        let registry = &self.registry;
        let despawn_queue = &self.despawn_queue;
        let job = self.spawn_queue.drain_one(
            self.elapsed,
            self.cfg.job_stale_secs,
            |j| match registry.get(j.region) {
                Some(r) => {
                    let effective = r
                        .occupants
                        .iter()
                        .filter(|e| !despawn_queue.contains(**e))
                        .count();
                    effective < r.target as usize
                }
                None => false,
            },
        );
        if let Some(job) = job {
            self.in_flight = Some(InFlightSpawn {
                job,
                phase: SpawnPhase::Deferred {
                    realize_at: self.tick_count + self.cfg.spawn_defer_ticks,
                },
            });
        }
    }

    fn drive_in_flight(&mut self) {
        let Some(flight) = self.in_flight else {
            return;
        };
        match flight.phase {
            SpawnPhase::Deferred { realize_at } if self.tick_count >= realize_at => {
                match self.realize_spawn(flight.job) {
                    SpawnResult::Spawned => {
                        self.spawn_failures = 0;
                        self.spawned_total += 1;
                        self.in_flight = Some(InFlightSpawn {
                            job: flight.job,
                            phase: SpawnPhase::Settling {
                                release_at: self.tick_count + self.cfg.spawn_settle_ticks,
                            },
                        });
                    }
                    SpawnResult::Skipped => {
                        self.in_flight = None;
                    }
                    SpawnResult::Failed => {
                        self.spawn_failures += 1;
                        if self.spawn_failures >= self.cfg.spawn_failure_threshold {
                            log::warn!(
                                "{} consecutive spawn failures; host may not be ready",
                                self.spawn_failures
                            );
                            self.spawn_failures = 0;
                        }
                        self.in_flight = None;
                    }
                }
            }
            SpawnPhase::Settling { release_at } if self.tick_count >= release_at => {
                self.in_flight = None;
            }
            _ => {}
        }
    }

    fn realize_spawn(&mut self, job: SpawnJob) -> SpawnResult {
        // The region can fill up while the job sits deferred.
        let still_needed = match self.registry.get(job.region) {
            Some(r) => {
                let effective = r
                    .occupants
                    .iter()
                    .filter(|e| !self.despawn_queue.contains(**e))
                    .count();
                effective < r.target as usize
            }
            None => false,
        };
        if !still_needed {
            return SpawnResult::Skipped;
        }

        let mut rng = rand::thread_rng();
        let position = job.anchor + jitter(self.cfg.spawn_jitter, &mut rng);

        // Reactivating a pooled agent is cheaper than a fresh allocation.
        if let Some(entity) = self.pool.take_fresh(self.elapsed) {
            let data = self
                .arena
                .get::<&AgentRecord>(entity)
                .ok()
                .map(|r| (r.handle, r.route));
            match data {
                Some((handle, route)) if self.host.is_live(handle) => {
                    self.host.warp(handle, position);
                    self.host.activate(handle);
                    self.host.restart_patrol(handle, route);
                    if let Ok(mut record) = self.arena.get::<&mut AgentRecord>(entity) {
                        record.phase = AgentPhase::Active;
                        record.region = Some(job.region);
                    }
                    let _ = self.arena.insert_one(entity, StuckTracker::new(position));
                    if let Some(r) = self.registry.get_mut(job.region) {
                        r.occupants.push(entity);
                    }
                    return SpawnResult::Spawned;
                }
                _ => {
                    // Pooled entity died out from under us; drop the record
                    // and fall through to a fresh allocation.
                    let _ = self.arena.despawn(entity);
                }
            }
        }

        let Some(prefab) = self.host.find_prefab(self.cfg.agent_type_id) else {
            return SpawnResult::Failed;
        };
        let heading = rng.gen_range(0.0..std::f32::consts::TAU);
        let Some(handle) = self.host.instantiate(prefab, position, heading) else {
            return SpawnResult::Failed;
        };
        self.host.replicate(handle);
        self.host.activate(handle);
        self.host.set_speed(handle, self.cfg.agent_speed);
        self.host.set_acceleration(handle, self.cfg.agent_acceleration);

        // Route resources are authored per region.
        let route = RouteId(job.region.0 as u32);
        let entity = self.arena.spawn((
            AgentRecord {
                handle,
                region: Some(job.region),
                route,
                phase: AgentPhase::Active,
            },
            StuckTracker::new(position),
        ));
        if let Some(r) = self.registry.get_mut(job.region) {
            r.occupants.push(entity);
        }
        SpawnResult::Spawned
    }

    fn drain_despawn_queue(&mut self) {
        let jobs = self.despawn_queue.drain(
            self.cfg.despawn_per_tick,
            self.elapsed,
            self.cfg.job_stale_secs,
        );
        for job in jobs {
            self.complete_despawn(job);
        }
    }

    fn complete_despawn(&mut self, job: DespawnJob) {
        let data = self
            .arena
            .get::<&AgentRecord>(job.agent)
            .ok()
            .map(|r| (r.handle, r.region, r.phase));
        let Some((handle, record_region, phase)) = data else {
            return;
        };
        if phase != AgentPhase::Active {
            return;
        }

        if let Some(region_id) = job.region.or(record_region) {
            if let Some(r) = self.registry.get_mut(region_id) {
                r.occupants.retain(|e| *e != job.agent);
            }
        }
        self.host.deactivate(handle);
        let _ = self.arena.remove_one::<StuckTracker>(job.agent);

        if self.host.is_live(handle) && self.pool.try_admit(job.agent, self.elapsed) {
            if let Ok(mut record) = self.arena.get::<&mut AgentRecord>(job.agent) {
                record.phase = AgentPhase::Pooled;
                record.region = None;
            }
        } else {
            self.host.destroy(handle);
            let _ = self.arena.despawn(job.agent);
        }
        self.despawned_total += 1;
    }

    fn evict_expired_pool(&mut self) {
        for entity in self.pool.take_expired(self.elapsed) {
            let handle = self
                .arena
                .get::<&AgentRecord>(entity)
                .ok()
                .map(|r| r.handle);
            if let Some(handle) = handle {
                self.host.destroy(handle);
            }
            let _ = self.arena.despawn(entity);
        }
    }

    /// One full despawn sweep, performed exactly once per inactive period.
    /// Deactivation is a once-per-day bulk operation, so it bypasses the
    /// per-tick despawn budget.
    fn full_despawn_sweep(&mut self) {
        log::info!("activity window closed: full despawn sweep");
        let actives: Vec<(hecs::Entity, crate::world::EntityHandle)> = self
            .arena
            .query::<&AgentRecord>()
            .iter()
            .filter(|(_, r)| r.phase == AgentPhase::Active)
            .map(|(e, r)| (e, r.handle))
            .collect();

        for (entity, handle) in actives {
            self.host.deactivate(handle);
            let _ = self.arena.remove_one::<StuckTracker>(entity);
            if self.host.is_live(handle) && self.pool.try_admit(entity, self.elapsed) {
                if let Ok(mut record) = self.arena.get::<&mut AgentRecord>(entity) {
                    record.phase = AgentPhase::Pooled;
                    record.region = None;
                }
            } else {
                self.host.destroy(handle);
                let _ = self.arena.despawn(entity);
            }
            self.despawned_total += 1;
        }

        self.registry.clear_occupants();
        self.spawn_queue.clear();
        self.despawn_queue.clear();
        self.in_flight = None;
        self.machine.reset(self.elapsed);
    }
}

fn jitter<R: Rng>(amount: f32, rng: &mut R) -> Vec3 {
    if amount <= 0.0 {
        return Vec3::ZERO;
    }
    Vec3::new(
        rng.gen_range(-amount..amount),
        0.0,
        rng.gen_range(-amount..amount),
    )
}

/// Pick a spawn anchor, avoiding points in the player's immediate vicinity.
/// When every anchor is too close, the farthest one from the player wins.
fn choose_anchor<R: Rng>(
    region: &Region,
    player: Option<Vec3>,
    min_player_distance: f32,
    rng: &mut R,
) -> Vec3 {
    let candidates: &[Vec3] = if region.anchors.is_empty() {
        std::slice::from_ref(&region.center)
    } else {
        &region.anchors
    };
    let Some(player) = player else {
        return candidates[rng.gen_range(0..candidates.len())];
    };

    let eligible: Vec<Vec3> = candidates
        .iter()
        .copied()
        .filter(|a| a.distance(&player) >= min_player_distance)
        .collect();
    if eligible.is_empty() {
        return candidates
            .iter()
            .copied()
            .max_by(|a, b| {
                a.distance(&player)
                    .partial_cmp(&b.distance(&player))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(region.center);
    }
    eligible[rng.gen_range(0..eligible.len())]
}
