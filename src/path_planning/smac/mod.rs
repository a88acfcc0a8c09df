//! SE2 lattice planning with costmap-aware smoothing
//!
//! Searches position x heading with per-vehicle motion primitives, then
//! refines the gridded result into a smooth world-frame path.

pub mod a_star;
pub mod config;
pub mod motion_model;
pub mod node_se2;
pub mod smac_planner;
pub mod smoother;
pub mod upsampler;

pub use a_star::{
    AStarAlgorithm, Neighbor, SearchNode, SearchOutcome, SearchParams, TIME_CHECK_INTERVAL,
};
pub use config::PlannerConfig;
pub use motion_model::{
    resolve_motion_model, MotionModel, MotionModelChoice, MotionPrimitive, MotionTable,
};
pub use node_se2::{Coordinates, NodeSE2};
pub use smac_planner::{remove_hook, PlanFailure, PlanResponse, SmacPlanner};
pub use smoother::{OptimizerParams, Smoother, SmootherParams, Solution, Termination};
pub use upsampler::Upsampler;
