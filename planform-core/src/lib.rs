//! # Planform containment
//!
//! Decides which drawing objects lie inside a planform (a closed outline on the page) by
//! comparing rasterized masks, and keeps the resulting membership sets fresh as the editor
//! mutates the page.
//!
//! * [`raster`] turns outlines and strokes into pixel [masks](raster::Mask).
//! * [`containment`] applies the overlap [policy](containment::ContainmentPolicy).
//! * [`membership`] caches one versioned snapshot per planform and recomputes on demand.
//! * [`io`] persists the registry, planforms and snapshots.

pub mod config;
pub mod containment;
pub mod id;
pub mod io;
pub mod membership;
pub mod planform;
pub mod raster;
pub mod registry;
pub mod world;

pub use config::EngineConfig;
pub use containment::ContainmentPolicy;
pub use membership::{MembershipResult, SnapshotManager, Urgency};
pub use planform::{Planform, PlanformID};
pub use registry::{ObjectID, Registry, SharedRegistry};
pub use world::WorldVersion;
