//! se2_planner - SE2 lattice path planning over 2D costmaps
//!
//! Plans kinematically feasible paths for ackermann, differential and
//! omnidirectional vehicles: A* over position x heading with per-vehicle
//! motion primitives, followed by costmap-aware smoothing and upsampling.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod mapping;
pub mod path_planning;

// Re-export common types for convenience
pub use common::{GlobalPlanner, PathOptimizer, Path2D, Point2D, Pose2D, Obstacles};
pub use common::{PlannerError, PlannerResult};
pub use mapping::{Costmap2D, SharedCostmap};
pub use path_planning::smac::{PlanFailure, PlanResponse, PlannerConfig, SmacPlanner};
