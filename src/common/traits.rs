//! Common traits defining the seams of the planning pipeline

use nalgebra::Vector2;

use crate::common::error::PlannerResult;
use crate::common::types::Pose2D;
use crate::mapping::Costmap2D;
use crate::path_planning::smac::{PlanResponse, SmootherParams};

/// Trait for global planners answering one start/goal request at a time
pub trait GlobalPlanner {
    /// Plan a path from start to goal in world coordinates.
    ///
    /// Only configuration-class errors are returned as `Err`; search and
    /// optimizer outcomes are reported inside the response.
    fn create_plan(&self, start: Pose2D, goal: Pose2D) -> PlannerResult<PlanResponse>;
}

/// Trait for costmap-aware path optimizers
///
/// Implementations must be pure: no state is retained between calls, so a
/// failed call leaves the caller free to fall back to its input path.
pub trait PathOptimizer: Send + Sync {
    /// Optimize `path` against `costmap` and the weights in `params`.
    fn smooth(
        &self,
        path: &[Vector2<f64>],
        costmap: &Costmap2D,
        params: &SmootherParams,
    ) -> PlannerResult<Vec<Vector2<f64>>>;
}

/// Trait for path densifiers run after smoothing
pub trait PathUpsampler: Send + Sync {
    /// Insert `ratio - 1` points per segment of `path`, keeping its points.
    fn upsample(
        &self,
        path: &[Vector2<f64>],
        params: &SmootherParams,
        ratio: usize,
    ) -> PlannerResult<Vec<Vector2<f64>>>;
}
