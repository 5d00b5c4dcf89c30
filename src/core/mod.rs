//! Core library modules for linetrack
//!
//! This module contains the internal implementation details of the
//! linetrack library.

pub mod artifacts;
pub mod error;
pub mod fixloop;
pub mod geo;
pub mod maneuver;
pub mod relation;
pub mod route;
pub mod stitch;
pub mod stops;
pub mod tracker;
pub mod wayset;

// Re-export main types for internal use
pub use error::{Error, Result};
pub use fixloop::{FixLoop, FixLoopConfig, FixStream, LoopState};
pub use geo::Coord;
pub use maneuver::{Maneuver, ManeuverPlan, TurnParams};
pub use relation::{ParsedRelation, RelationConfig, RelationSource};
pub use route::{Projection, Route, SegmentLocation};
pub use stitch::{stitch, StitchOutcome};
pub use stops::{Stop, StopIndex, StopRole};
pub use tracker::{Fix, NavigationState, Tracker};
pub use wayset::{Way, WaySet};
