//! SE2 lattice planner
//!
//! One planning call runs: costmap (optionally downsampled) -> search graph ->
//! A* -> world path -> smoothing -> hook removal -> upsampling. Each optional
//! refinement stage falls back to the previous stage's path when it fails.
//!
//! The costmap read lock is held for the whole call. The motion table is
//! built once and shared read-only; every call gets its own node pool, so one
//! planner may serve concurrent requests.

use std::borrow::Cow;
use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use nalgebra::Vector2;

use crate::common::{
    normalize_angle, GlobalPlanner, Path2D, PathOptimizer, PathUpsampler, PlannerError,
    PlannerResult, Pose2D,
};
use crate::mapping::{Costmap2D, CostmapDownsampler, SharedCostmap};

use super::a_star::{AStarAlgorithm, SearchOutcome, SearchParams};
use super::config::PlannerConfig;
use super::motion_model::{MotionModel, MotionTable};
use super::node_se2::{Coordinates, NodeSE2};
use super::smoother::{Smoother, SmootherParams};
use super::upsampler::Upsampler;

/// Keep every n-th search point before smoothing
const SMOOTHING_DECIMATION: usize = 4;
/// Fewest points the smoother is given
const MIN_SMOOTHING_POINTS: usize = 4;

/// Why a planning call produced no path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanFailure {
    NoPathFound,
    IterationsExceeded,
    TimedOut,
    InvalidUse(String),
}

impl fmt::Display for PlanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanFailure::NoPathFound => write!(f, "no valid path found"),
            PlanFailure::IterationsExceeded => write!(f, "exceeded maximum iterations"),
            PlanFailure::TimedOut => write!(f, "exceeded maximum planning time"),
            PlanFailure::InvalidUse(msg) => write!(f, "invalid use: {}", msg),
        }
    }
}

/// Result of one planning call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanResponse {
    /// Final path, start to goal
    pub poses: Vec<Pose2D>,
    /// Search path in world coordinates before decimation and smoothing
    pub raw_poses: Vec<Pose2D>,
    pub iterations: usize,
    pub smoothed: bool,
    pub upsampled: bool,
    pub failure: Option<PlanFailure>,
}

impl PlanResponse {
    fn failed(failure: PlanFailure, iterations: usize) -> Self {
        Self {
            iterations,
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn path(&self) -> Path2D {
        Path2D::from_poses(&self.poses)
    }

    pub fn raw_path(&self) -> Path2D {
        Path2D::from_poses(&self.raw_poses)
    }
}

/// Lattice planner over a shared costmap
pub struct SmacPlanner {
    name: String,
    costmap: SharedCostmap,
    motion_table: Arc<MotionTable>,
    search_params: SearchParams,
    tolerance: f64,
    downsampler: Option<CostmapDownsampler>,
    smoother: Option<Box<dyn PathOptimizer>>,
    smoother_params: SmootherParams,
    upsampler: Option<Box<dyn PathUpsampler>>,
    upsampling_ratio: usize,
}

impl fmt::Debug for SmacPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmacPlanner")
            .field("name", &self.name)
            .field("motion_model", &self.motion_table.motion_model())
            .field("search_params", &self.search_params)
            .field("tolerance", &self.tolerance)
            .field("downsampler", &self.downsampler)
            .field("smoothing", &self.smoother.is_some())
            .field("upsampling", &self.upsampler.is_some())
            .field("upsampling_ratio", &self.upsampling_ratio)
            .finish()
    }
}

impl SmacPlanner {
    pub fn new(name: &str, config: PlannerConfig, costmap: SharedCostmap) -> PlannerResult<Self> {
        config.validate()?;

        let motion_model = config.motion_model();
        let factor = config.effective_downsampling_factor();
        let resolution = costmap
            .read()
            .map_err(|_| PlannerError::InvalidUse("costmap lock is poisoned".to_string()))?
            .resolution();
        let turning_radius_cells = config.minimum_turning_radius / (resolution * factor as f64);
        if motion_model.is_curvature_constrained() && turning_radius_cells < SQRT_2 / 2.0 {
            warn!(
                "{}: minimum turning radius of {:.3} cells cannot reach the next cell, \
                 arcs will turn further than the radius implies",
                name, turning_radius_cells
            );
        }
        let motion_table = Arc::new(MotionTable::new(
            motion_model,
            config.angle_quantization_bins,
            turning_radius_cells,
        )?);

        let search_params = config.search_params();
        let downsampler = if config.downsample_costmap && factor > 1 {
            Some(CostmapDownsampler::new(factor)?)
        } else {
            None
        };
        let smoother = config.smooth_path.then(|| {
            Box::new(Smoother::new(config.allow_unknown)) as Box<dyn PathOptimizer>
        });
        let upsampler = (config.smooth_path && config.upsample_path)
            .then(|| Box::new(Upsampler::new()) as Box<dyn PathUpsampler>);
        let upsampling_ratio = config.upsampling_ratio();

        info!(
            "Configured plugin {} of type SmacPlanner with travel cost {:.2}, tolerance {:.2}, \
             maximum iterations {}, max on approach iterations {}, and {} unknown traversal. \
             Using motion model {}.",
            name,
            config.travel_cost_scale,
            config.tolerance,
            format_limit(search_params.max_iterations),
            format_limit(search_params.max_on_approach_iterations),
            if config.allow_unknown { "allowing" } else { "not allowing" },
            motion_model
        );

        Ok(Self {
            name: name.to_string(),
            costmap,
            motion_table,
            search_params,
            tolerance: config.tolerance,
            downsampler,
            smoother_params: config.smoother_params(),
            smoother,
            upsampler,
            upsampling_ratio,
        })
    }

    /// Replace the smoothing stage. Has no effect when smoothing is disabled.
    pub fn with_optimizer(mut self, optimizer: impl PathOptimizer + 'static) -> Self {
        if self.smoother.is_some() {
            self.smoother = Some(Box::new(optimizer));
        }
        self
    }

    /// Replace the upsampling stage. Has no effect when upsampling is disabled.
    pub fn with_upsampler(mut self, upsampler: impl PathUpsampler + 'static) -> Self {
        if self.upsampler.is_some() {
            self.upsampler = Some(Box::new(upsampler));
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn motion_model(&self) -> MotionModel {
        self.motion_table.motion_model()
    }

    pub fn motion_table(&self) -> &MotionTable {
        &self.motion_table
    }

    /// Heading bin nearest to `yaw`
    pub fn heading_bin(&self, yaw: f64) -> usize {
        let bins = self.motion_table.num_angle_quantization();
        let angle = yaw.rem_euclid(2.0 * PI);
        ((angle / self.motion_table.bin_size()).round() as usize) % bins
    }

    fn plan(&self, start: Pose2D, goal: Pose2D) -> PlannerResult<PlanResponse> {
        let started = Instant::now();
        let guard = self
            .costmap
            .read()
            .map_err(|_| PlannerError::InvalidUse("costmap lock is poisoned".to_string()))?;
        let costmap: Cow<'_, Costmap2D> = match &self.downsampler {
            Some(downsampler) => Cow::Owned(downsampler.downsample(&guard)?),
            None => Cow::Borrowed(&*guard),
        };

        let mut a_star =
            AStarAlgorithm::<NodeSE2>::new(self.motion_table.clone(), self.search_params.clone())?;
        a_star.create_graph(
            costmap.size_in_cells_x(),
            costmap.size_in_cells_y(),
            self.motion_table.num_angle_quantization(),
            costmap.char_map(),
        )?;

        let (mx, my) = costmap.world_to_map(start.x, start.y).ok_or_else(|| {
            let msg = format!("start ({:.3}, {:.3}) is outside the map", start.x, start.y);
            PlannerError::InvalidUse(msg)
        })?;
        a_star.set_start(mx, my, self.heading_bin(start.yaw))?;
        let (mx, my) = costmap.world_to_map(goal.x, goal.y).ok_or_else(|| {
            let msg = format!("goal ({:.3}, {:.3}) is outside the map", goal.x, goal.y);
            PlannerError::InvalidUse(msg)
        })?;
        a_star.set_goal(mx, my, self.heading_bin(goal.yaw))?;

        let outcome = a_star.create_path(self.tolerance / costmap.resolution())?;
        debug!(
            "{}: search finished in {:.2} ms after {} iterations",
            self.name,
            started.elapsed().as_secs_f64() * 1e3,
            outcome.iterations()
        );

        let (path, iterations) = match outcome {
            SearchOutcome::Found { path, iterations } => (path, iterations),
            SearchOutcome::NoPathFound { iterations } => {
                return Ok(self.failure(PlanFailure::NoPathFound, iterations))
            }
            SearchOutcome::IterationsExceeded { iterations } => {
                return Ok(self.failure(PlanFailure::IterationsExceeded, iterations))
            }
            SearchOutcome::TimedOut { iterations } => {
                return Ok(self.failure(PlanFailure::TimedOut, iterations))
            }
        };

        let raw_poses = self.to_world(&path, &costmap);
        let mut response = PlanResponse {
            poses: raw_poses.clone(),
            raw_poses,
            iterations,
            ..PlanResponse::default()
        };

        let smoother = match &self.smoother {
            Some(smoother) => smoother,
            None => return Ok(response),
        };

        response.poses = decimate(&response.raw_poses, SMOOTHING_DECIMATION);
        if response.poses.len() < MIN_SMOOTHING_POINTS {
            debug!("{}: {} points, skipping smoothing", self.name, response.poses.len());
            return Ok(response);
        }

        let points: Vec<Vector2<f64>> =
            response.poses.iter().map(|p| Vector2::new(p.x, p.y)).collect();
        let mut points = match smoother.smooth(&points, &costmap, &self.smoother_params) {
            Ok(smoothed) => smoothed,
            Err(e) => {
                warn!("{}: failed to smooth plan, {}", self.name, e);
                return Ok(response);
            }
        };
        remove_hook(&mut points);
        response.smoothed = true;

        if let Some(upsampler) = &self.upsampler {
            match upsampler.upsample(&points, &self.smoother_params, self.upsampling_ratio) {
                Ok(dense) => {
                    points = dense;
                    response.upsampled = true;
                }
                Err(e) => warn!("{}: failed to upsample plan, {}", self.name, e),
            }
        }

        response.poses = with_tangent_headings(&points, goal.yaw);
        debug!(
            "{}: plan of {} poses in {:.2} ms",
            self.name,
            response.poses.len(),
            started.elapsed().as_secs_f64() * 1e3
        );
        Ok(response)
    }

    fn failure(&self, failure: PlanFailure, iterations: usize) -> PlanResponse {
        warn!("{}: failed to create plan, {}.", self.name, failure);
        PlanResponse::failed(failure, iterations)
    }

    /// Search path (goal to start) to world poses (start to goal).
    /// Consecutive states at one position collapse into the later heading.
    fn to_world(&self, path: &[Coordinates], costmap: &Costmap2D) -> Vec<Pose2D> {
        let bin_size = self.motion_table.bin_size();
        let mut poses: Vec<Pose2D> = Vec::with_capacity(path.len());
        for c in path.iter().rev() {
            let (wx, wy) = costmap.map_to_world(c.x, c.y);
            let pose = Pose2D::new(wx, wy, normalize_angle(c.theta * bin_size));
            let same_position = poses
                .last()
                .map_or(false, |last| (last.x - wx).abs() < 1e-9 && (last.y - wy).abs() < 1e-9);
            if same_position {
                poses.pop();
            }
            poses.push(pose);
        }
        poses
    }
}

impl GlobalPlanner for SmacPlanner {
    fn create_plan(&self, start: Pose2D, goal: Pose2D) -> PlannerResult<PlanResponse> {
        match self.plan(start, goal) {
            Ok(response) => Ok(response),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                let msg = match e {
                    PlannerError::InvalidUse(msg) => msg,
                    other => other.to_string(),
                };
                Ok(self.failure(PlanFailure::InvalidUse(msg), 0))
            }
        }
    }
}

fn format_limit(limit: usize) -> String {
    if limit == usize::MAX {
        "unbounded".to_string()
    } else {
        limit.to_string()
    }
}

/// Every `ratio`-th pose plus the last one
fn decimate(poses: &[Pose2D], ratio: usize) -> Vec<Pose2D> {
    let mut kept: Vec<Pose2D> = poses.iter().step_by(ratio).copied().collect();
    if poses.len() > 1 && (poses.len() - 1) % ratio != 0 {
        kept.extend(poses.last().copied());
    }
    kept
}

fn with_tangent_headings(points: &[Vector2<f64>], goal_yaw: f64) -> Vec<Pose2D> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let yaw = match points.get(i + 1) {
                Some(next) => (next.y - p.y).atan2(next.x - p.x),
                None => goal_yaw,
            };
            Pose2D::new(p.x, p.y, yaw)
        })
        .collect()
}

/// Pull the second-to-last point back if it overshoots the pinned goal.
///
/// The point is replaced by the midpoint of its neighbours when that midpoint
/// is closer to the goal. Paths under 3 points are left alone.
pub fn remove_hook(path: &mut [Vector2<f64>]) {
    let n = path.len();
    if n < 3 {
        return;
    }
    let last = path[n - 1];
    let midpoint = (path[n - 3] + last) / 2.0;
    if (path[n - 2] - last).norm_squared() > (midpoint - last).norm_squared() {
        path[n - 2] = midpoint;
    }
}
