//! Populace Core — ambient agent population scheduler.
//!
//! Maintains a target population of mobile agents across named geographic
//! regions of a simulated world, activating and deactivating that population
//! on a time-of-day schedule while respecting strict per-tick throughput
//! limits. Everything runs cooperatively inside a single `tick()` call
//! invoked once per host frame — no threads, no blocking.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agents`] | Agent record components stored in a `hecs` arena |
//! | [`clock`] | Activity-window clock, tiers, transition latching |
//! | [`config`] | Read-only scheduler tunables and validation |
//! | [`geometry`] | Vec3 math for centers, anchors, agent positions |
//! | [`headless`] | In-memory world host for tests and harnesses |
//! | [`pool`] | Entity pool — recycles despawned agents with a TTL |
//! | [`population`] | Population state machine (convergence phases) |
//! | [`queue`] | Rate-limited spawn/despawn queues |
//! | [`reconcile`] | Bookkeeping-vs-reality reconciliation pass |
//! | [`region`] | Region registry, targets, containment, overlap |
//! | [`scheduler`] | Orchestrator — the per-frame tick entry point |
//! | [`stuck`] | Stalled-agent detection and recovery |
//! | [`world`] | External collaborator traits (world host, navigator) |
//!
//! # Example
//!
//! ```rust,no_run
//! use populace_core::prelude::*;
//! use populace_core::headless::HeadlessWorld;
//!
//! let mut scheduler = PopulationScheduler::new(
//!     HeadlessWorld::new(),
//!     SchedulerConfig::default(),
//! );
//! scheduler.add_region(Region::new("market", Vec3::new(50.0, 0.0, 50.0), 30.0, 8));
//! scheduler.initialize().unwrap();
//!
//! loop {
//!     scheduler.tick(1.0 / 60.0); // once per host frame
//! }
//! ```

pub mod agents;
pub mod clock;
pub mod config;
pub mod geometry;
pub mod headless;
pub mod pool;
pub mod population;
pub mod queue;
pub mod reconcile;
pub mod region;
pub mod scheduler;
pub mod stuck;
pub mod world;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::clock::{Tier, Transition};
    pub use crate::config::SchedulerConfig;
    pub use crate::geometry::Vec3;
    pub use crate::population::PopulationState;
    pub use crate::region::{Region, RegionId};
    pub use crate::scheduler::{PopulationScheduler, SchedulerStats};
    pub use crate::world::{EntityHandle, Navigator, PrefabHandle, RouteId, WorldHost};
}
