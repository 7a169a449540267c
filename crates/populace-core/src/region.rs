//! Region registry — named circular catchment areas with their own targets,
//! anchors, and occupant bookkeeping.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Stable index of a region in its registry, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(pub usize);

/// A named circular catchment area with its own agent population target.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub center: Vec3,
    pub radius: f32,
    /// Ordered candidate spawn anchor points. Empty means "spawn at center".
    pub anchors: Vec<Vec3>,
    /// Agent records currently assigned here. Mutated only by the spawn and
    /// despawn completion paths and by reconciliation.
    pub occupants: Vec<hecs::Entity>,
    /// Current population target, rewritten by tier redistribution.
    pub target: u32,
    /// Authored ceiling this region's target is clamped to.
    pub max_population: u32,
    /// Seconds-since-start of the last time the player stood in this region.
    pub last_visited: Option<f64>,
}

impl Region {
    pub fn new(name: impl Into<String>, center: Vec3, radius: f32, max_population: u32) -> Self {
        Self {
            name: name.into(),
            center,
            radius,
            anchors: Vec::new(),
            occupants: Vec::new(),
            target: 0,
            max_population,
            last_visited: None,
        }
    }

    pub fn with_anchors(mut self, anchors: Vec<Vec3>) -> Self {
        self.anchors = anchors;
        self
    }

    /// A fixed guard post: zero-radius region with a single anchor and a
    /// population of one. Not a separate subsystem, just a degenerate region.
    pub fn sentry_post(name: impl Into<String>, anchor: Vec3) -> Self {
        Self::new(name, anchor, 0.0, 1).with_anchors(vec![anchor])
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.center.distance_squared(&point) <= self.radius * self.radius
    }

    /// Agents missing relative to target.
    pub fn deficit(&self) -> u32 {
        (self.target as i64 - self.occupants.len() as i64).max(0) as u32
    }

    /// Agents above target.
    pub fn surplus(&self) -> u32 {
        (self.occupants.len() as i64 - self.target as i64).max(0) as u32
    }
}

/// Holds all authored regions and answers spatial and budget queries.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: Vec<Region>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, region: Region) -> RegionId {
        self.regions.push(region);
        RegionId(self.regions.len() - 1)
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, r)| (RegionId(i), r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RegionId, &mut Region)> {
        self.regions
            .iter_mut()
            .enumerate()
            .map(|(i, r)| (RegionId(i), r))
    }

    /// Split a global population ceiling across regions: integer floor
    /// division with the remainder handed out one-per-region in registration
    /// order, each share clamped to the region's authored maximum. Budget
    /// clamped off by a cap is reassigned to regions with headroom, so the
    /// assigned total always equals `min(budget, sum of caps)`.
    pub fn redistribute(&mut self, total_budget: u32) {
        if self.regions.is_empty() {
            return;
        }
        for region in &mut self.regions {
            region.target = 0;
        }
        let mut remaining = total_budget;
        while remaining > 0 {
            let open = self
                .regions
                .iter()
                .filter(|r| r.target < r.max_population)
                .count() as u32;
            if open == 0 {
                break;
            }
            let share = remaining / open;
            let mut extra = remaining % open;
            for region in self
                .regions
                .iter_mut()
                .filter(|r| r.target < r.max_population)
            {
                let bonus = if extra > 0 {
                    extra -= 1;
                    1
                } else {
                    0
                };
                let grant = (share + bonus).min(region.max_population - region.target);
                region.target += grant;
                remaining -= grant;
            }
        }
    }

    /// Region whose boundary contains `point` and whose center is closest.
    pub fn nearest_region_containing(&self, point: Vec3) -> Option<RegionId> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.contains(point))
            .min_by(|(_, a), (_, b)| {
                a.center
                    .distance_squared(&point)
                    .partial_cmp(&b.center.distance_squared(&point))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| RegionId(i))
    }

    /// Whether two regions' coverage areas touch within a buffer margin.
    /// Overlapping regions share de facto coverage, so excess trimming is
    /// suppressed there to avoid oscillation.
    pub fn overlaps(&self, a: RegionId, b: RegionId, buffer: f32) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(ra), Some(rb)) => {
                ra.center.distance(&rb.center) <= ra.radius + rb.radius + buffer
            }
            _ => false,
        }
    }

    /// Whether `id` overlaps any other registered region.
    pub fn overlaps_any(&self, id: RegionId, buffer: f32) -> bool {
        self.regions
            .iter()
            .enumerate()
            .any(|(i, _)| i != id.0 && self.overlaps(id, RegionId(i), buffer))
    }

    /// Record a player visit against the region the player stands in.
    pub fn mark_visited(&mut self, player: Vec3, now: f64) {
        if let Some(id) = self.nearest_region_containing(player) {
            if let Some(region) = self.get_mut(id) {
                region.last_visited = Some(now);
            }
        }
    }

    /// Total live occupant bookkeeping across all regions.
    pub fn total_occupancy(&self) -> usize {
        self.regions.iter().map(|r| r.occupants.len()).sum()
    }

    /// Drop all occupant bookkeeping (full despawn sweep / world teardown).
    pub fn clear_occupants(&mut self) {
        for region in &mut self.regions {
            region.occupants.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(caps: &[u32]) -> RegionRegistry {
        let mut reg = RegionRegistry::new();
        for (i, &cap) in caps.iter().enumerate() {
            reg.register(Region::new(
                format!("r{}", i),
                Vec3::new(i as f32 * 100.0, 0.0, 0.0),
                20.0,
                cap,
            ));
        }
        reg
    }

    #[test]
    fn test_redistribute_even_split() {
        let mut reg = registry(&[10, 10, 10]);
        reg.redistribute(9);
        let targets: Vec<u32> = reg.iter().map(|(_, r)| r.target).collect();
        assert_eq!(targets, vec![3, 3, 3]);
    }

    #[test]
    fn test_redistribute_remainder_in_registration_order() {
        let mut reg = registry(&[10, 10, 10]);
        reg.redistribute(8);
        let targets: Vec<u32> = reg.iter().map(|(_, r)| r.target).collect();
        assert_eq!(targets, vec![3, 3, 2]);
    }

    #[test]
    fn test_redistribute_respects_caps() {
        let mut reg = registry(&[2, 10, 10]);
        reg.redistribute(30);
        let targets: Vec<u32> = reg.iter().map(|(_, r)| r.target).collect();
        assert_eq!(targets, vec![2, 10, 10]);
        // No region above its cap; sum == min(budget, sum of caps)
        let sum: u32 = targets.iter().sum();
        assert_eq!(sum, 22);
    }

    #[test]
    fn test_redistribute_reassigns_clamped_share() {
        // Region 0's cap binds below its floor share; the clamped-off budget
        // goes to the regions with headroom instead of being lost.
        let mut reg = registry(&[2, 10, 10]);
        reg.redistribute(12);
        let targets: Vec<u32> = reg.iter().map(|(_, r)| r.target).collect();
        assert_eq!(targets, vec![2, 5, 5]);
    }

    #[test]
    fn test_redistribute_budget_property() {
        // sum(assigned) == min(B, sum(caps)), binding caps included
        for &(caps, budget) in &[
            (&[10u32, 10, 10, 10][..], 10u32),
            (&[1, 10, 10, 2][..], 12),
            (&[1, 10, 10, 2][..], 40),
            (&[3, 1, 2][..], 9),
        ] {
            let mut reg = registry(caps);
            reg.redistribute(budget);
            let caps_sum: u32 = caps.iter().sum();
            let sum: u32 = reg.iter().map(|(_, r)| r.target).sum();
            assert_eq!(sum, budget.min(caps_sum), "caps {:?} budget {}", caps, budget);
            for (id, r) in reg.iter() {
                assert!(r.target <= r.max_population, "region {:?} over cap", id);
            }
        }
    }

    #[test]
    fn test_nearest_region_containing_prefers_closer_center() {
        let mut reg = RegionRegistry::new();
        let a = reg.register(Region::new("a", Vec3::new(0.0, 0.0, 0.0), 50.0, 5));
        let b = reg.register(Region::new("b", Vec3::new(40.0, 0.0, 0.0), 50.0, 5));
        // Point inside both, closer to b's center
        assert_eq!(
            reg.nearest_region_containing(Vec3::new(30.0, 0.0, 0.0)),
            Some(b)
        );
        assert_eq!(
            reg.nearest_region_containing(Vec3::new(5.0, 0.0, 0.0)),
            Some(a)
        );
        assert_eq!(
            reg.nearest_region_containing(Vec3::new(500.0, 0.0, 0.0)),
            None
        );
    }

    #[test]
    fn test_overlaps_with_buffer() {
        let mut reg = RegionRegistry::new();
        let a = reg.register(Region::new("a", Vec3::new(0.0, 0.0, 0.0), 20.0, 5));
        let b = reg.register(Region::new("b", Vec3::new(45.0, 0.0, 0.0), 20.0, 5));
        assert!(!reg.overlaps(a, b, 0.0));
        assert!(reg.overlaps(a, b, 10.0));
        assert!(reg.overlaps_any(a, 10.0));
        assert!(!reg.overlaps_any(a, 0.0));
    }

    #[test]
    fn test_sentry_post_is_degenerate_region() {
        let post = Region::sentry_post("gate", Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(post.max_population, 1);
        assert_eq!(post.anchors.len(), 1);
        assert!(post.contains(Vec3::new(5.0, 0.0, 5.0)));
        assert!(!post.contains(Vec3::new(6.0, 0.0, 5.0)));
    }

    #[test]
    fn test_mark_visited() {
        let mut reg = registry(&[5, 5]);
        reg.mark_visited(Vec3::new(100.0, 0.0, 0.0), 12.5);
        assert_eq!(reg.get(RegionId(1)).unwrap().last_visited, Some(12.5));
        assert_eq!(reg.get(RegionId(0)).unwrap().last_visited, None);
    }
}
