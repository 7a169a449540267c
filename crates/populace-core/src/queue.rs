//! Pending spawn/despawn job queues, drained at a bounded rate per tick.
//!
//! Queues only hold intent. Realization happens in the scheduler's drain
//! paths, which re-validate every job — a job can go invalid between enqueue
//! and drain, and a stale job is dropped, never executed.

use crate::geometry::Vec3;
use crate::region::RegionId;

/// A pending request to put one agent into a region.
#[derive(Debug, Clone, Copy)]
pub struct SpawnJob {
    pub region: RegionId,
    pub anchor: Vec3,
    pub priority: f32,
    pub enqueued_at: f64,
}

/// A pending request to remove one agent. `region` is `None` for jobs raised
/// by despawn-everywhere sweeps where bookkeeping is already cleared.
#[derive(Debug, Clone, Copy)]
pub struct DespawnJob {
    pub agent: hecs::Entity,
    pub region: Option<RegionId>,
    pub enqueued_at: f64,
}

/// Priority-ordered pending spawns.
#[derive(Debug, Default)]
pub struct SpawnQueue {
    jobs: Vec<SpawnJob>,
}

impl SpawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs already queued against a region. Counted by the enqueue guard so
    /// a deficit can't be queued twice over.
    pub fn pending_for(&self, region: RegionId) -> usize {
        self.jobs.iter().filter(|j| j.region == region).count()
    }

    /// Enqueue unless the region is already at or above target counting both
    /// occupants and pending jobs — queue bloat here would overshoot once
    /// drained.
    pub fn enqueue(&mut self, job: SpawnJob, occupants: usize, target: u32) -> bool {
        if occupants + self.pending_for(job.region) >= target as usize {
            return false;
        }
        self.jobs.push(job);
        true
    }

    /// Remove and return the highest-priority job that is not stale and
    /// still passes `still_valid`. Stale and invalidated jobs encountered on
    /// the way are dropped. At most one job is returned per call; the
    /// caller's throttle decides how often that happens.
    pub fn drain_one<F>(&mut self, now: f64, stale_secs: f64, mut still_valid: F) -> Option<SpawnJob>
    where
        F: FnMut(&SpawnJob) -> bool,
    {
        let before = self.jobs.len();
        self.jobs.retain(|j| now - j.enqueued_at <= stale_secs);
        let dropped = before - self.jobs.len();
        if dropped > 0 {
            log::debug!("spawn queue dropped {} stale job(s)", dropped);
        }

        self.jobs.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        while !self.jobs.is_empty() {
            let job = self.jobs.remove(0);
            if still_valid(&job) {
                return Some(job);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}

/// FIFO pending despawns with a duplicate guard.
#[derive(Debug, Default)]
pub struct DespawnQueue {
    jobs: Vec<DespawnJob>,
}

impl DespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether an agent is already queued. An agent must never be queued for
    /// despawn twice.
    pub fn contains(&self, agent: hecs::Entity) -> bool {
        self.jobs.iter().any(|j| j.agent == agent)
    }

    pub fn enqueue(&mut self, job: DespawnJob) -> bool {
        if self.contains(job.agent) {
            return false;
        }
        self.jobs.push(job);
        true
    }

    /// Remove up to `max` non-stale jobs in FIFO order.
    pub fn drain(&mut self, max: usize, now: f64, stale_secs: f64) -> Vec<DespawnJob> {
        let mut out = Vec::new();
        while out.len() < max && !self.jobs.is_empty() {
            let job = self.jobs.remove(0);
            if now - job.enqueued_at > stale_secs {
                log::debug!("despawn queue dropped stale job");
                continue;
            }
            out.push(job);
        }
        out
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}
