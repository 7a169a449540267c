//! Scheduler tunables — consumed read-only by the core.
//!
//! Loading these from a file belongs to an external collaborator; when that
//! collaborator fails it falls back to these built-in defaults, so the core
//! only ever observes a fully populated config.

use serde::{Deserialize, Serialize};

use crate::clock::Tier;

/// Global population ceiling per time-of-day tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCeilings {
    pub morning: u32,
    pub afternoon: u32,
    pub evening: u32,
    pub night: u32,
}

impl TierCeilings {
    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Morning => self.morning,
            Tier::Afternoon => self.afternoon,
            Tier::Evening => self.evening,
            Tier::Night => self.night,
        }
    }
}

impl Default for TierCeilings {
    fn default() -> Self {
        Self {
            morning: 12,
            afternoon: 16,
            evening: 8,
            night: 4,
        }
    }
}

/// All scheduler tunables. Constructed with [`Default`] or deserialized by
/// the external config collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Per-tier global population ceilings, redistributed across regions.
    pub tier_ceilings: TierCeilings,

    /// Active window start, minutes since midnight (agents exist from here).
    pub active_start_minutes: u32,
    /// Active window end, minutes since midnight (half-open; may wrap).
    pub active_end_minutes: u32,
    /// A forward time step larger than this is treated as a discontinuity.
    pub time_jump_threshold_minutes: u32,

    /// How often (seconds) the population state machine re-measures regions.
    pub check_interval_secs: f64,
    /// Dwell time in the initial-population phase before verification.
    pub initial_settle_secs: f64,
    /// Maintenance poll interval after a scan found drift.
    pub maintenance_interval_secs: f64,
    /// Cheaper maintenance poll interval while scans come back clean.
    pub maintenance_interval_reduced_secs: f64,

    /// Minimum ticks between spawn-queue drains.
    pub spawn_throttle_ticks: u64,
    /// Ticks to wait between dequeuing a spawn job and realizing it.
    pub spawn_defer_ticks: u64,
    /// Ticks to hold the in-flight gate after a spawn completes.
    pub spawn_settle_ticks: u64,
    /// Maximum despawn jobs realized per tick.
    pub despawn_per_tick: usize,
    /// Seconds to suppress spawn drains after the host reports streaming.
    pub streaming_cooldown_secs: f64,
    /// Jobs older than this (seconds) are dropped, never realized.
    pub job_stale_secs: f64,
    /// Consecutive spawn failures before a diagnostic is emitted.
    pub spawn_failure_threshold: u32,

    /// Maximum agents held for reuse.
    pub pool_capacity: usize,
    /// Seconds a pooled agent stays eligible for reactivation.
    pub pool_ttl_secs: f64,
    /// Random positional jitter applied when reactivating near an anchor.
    pub spawn_jitter: f32,

    /// Seconds between stuck-detector passes.
    pub stuck_interval_secs: f64,
    /// Movement below this distance per sample counts as a stall.
    pub stuck_epsilon: f32,
    /// Consecutive stalled samples before recovery is attempted.
    pub stuck_threshold: u32,
    /// In-place repositions allowed before a stuck agent is replaced.
    pub stuck_recovery_cap: u32,
    /// Search radius for the walkable-position probe during recovery.
    pub stuck_search_radius: f32,

    /// Seconds between reconciliation passes.
    pub reconcile_interval_secs: f64,
    /// Dead entries removed in one pass above this count force a population
    /// reset while in maintenance mode.
    pub bulk_loss_threshold: usize,

    /// Don't spawn at anchors closer to the player than this.
    pub min_player_distance: f32,
    /// Seconds after a player visit during which a region's spawn jobs get a
    /// priority boost.
    pub visit_boost_secs: f64,
    /// Margin added to radii sums when testing region overlap.
    pub region_overlap_buffer: f32,
    /// When true, surplus agents are left in place instead of trimmed.
    pub preserve_excess: bool,

    /// Agent template type id passed to the host's prefab lookup.
    pub agent_type_id: u32,
    /// Walk speed applied to freshly spawned agents.
    pub agent_speed: f32,
    /// Acceleration applied to freshly spawned agents.
    pub agent_acceleration: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tier_ceilings: TierCeilings::default(),
            active_start_minutes: 6 * 60,
            active_end_minutes: 21 * 60,
            time_jump_threshold_minutes: 30,
            check_interval_secs: 2.0,
            initial_settle_secs: 60.0,
            maintenance_interval_secs: 20.0,
            maintenance_interval_reduced_secs: 45.0,
            spawn_throttle_ticks: 30,
            spawn_defer_ticks: 2,
            spawn_settle_ticks: 5,
            despawn_per_tick: 2,
            streaming_cooldown_secs: 3.0,
            job_stale_secs: 120.0,
            spawn_failure_threshold: 3,
            pool_capacity: 16,
            pool_ttl_secs: 300.0,
            spawn_jitter: 1.5,
            stuck_interval_secs: 10.0,
            stuck_epsilon: 0.1,
            stuck_threshold: 3,
            stuck_recovery_cap: 3,
            stuck_search_radius: 8.0,
            reconcile_interval_secs: 15.0,
            bulk_loss_threshold: 5,
            min_player_distance: 25.0,
            visit_boost_secs: 120.0,
            region_overlap_buffer: 5.0,
            preserve_excess: false,
            agent_type_id: 0,
            agent_speed: 1.2,
            agent_acceleration: 4.0,
        }
    }
}

impl SchedulerConfig {
    /// Check invariants the scheduler relies on. Called once at init; a bad
    /// hand-edited config is rejected before it can wedge the tick loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_start_minutes >= 1440 || self.active_end_minutes >= 1440 {
            return Err(ConfigError::InvalidWindow);
        }
        if self.active_start_minutes == self.active_end_minutes {
            return Err(ConfigError::InvalidWindow);
        }
        if self.spawn_throttle_ticks == 0 {
            return Err(ConfigError::ZeroInterval("spawn_throttle_ticks"));
        }
        if self.despawn_per_tick == 0 {
            return Err(ConfigError::ZeroInterval("despawn_per_tick"));
        }
        if self.check_interval_secs <= 0.0
            || self.maintenance_interval_secs <= 0.0
            || self.maintenance_interval_reduced_secs <= 0.0
            || self.stuck_interval_secs <= 0.0
            || self.reconcile_interval_secs <= 0.0
        {
            return Err(ConfigError::ZeroInterval("poll interval"));
        }
        if self.stuck_epsilon < 0.0 || self.stuck_threshold == 0 {
            return Err(ConfigError::InvalidStuckParams);
        }
        Ok(())
    }
}

/// Config validation failure.
#[derive(Debug)]
pub enum ConfigError {
    /// Activity window start/end out of range or degenerate.
    InvalidWindow,
    /// A rate-limit interval was zero or negative.
    ZeroInterval(&'static str),
    /// Stuck-detection thresholds can't work as given.
    InvalidStuckParams,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidWindow => write!(f, "activity window is invalid"),
            ConfigError::ZeroInterval(which) => {
                write!(f, "interval '{}' must be positive", which)
            }
            ConfigError::InvalidStuckParams => write!(f, "stuck-detection parameters are invalid"),
        }
    }
}

impl std::error::Error for ConfigError {}
