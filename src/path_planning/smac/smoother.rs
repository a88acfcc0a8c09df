//! Costmap-aware path smoother
//!
//! Minimizes a weighted cost over the free points of a path:
//!
//! - smoothness: `w_smooth * |p[i-1] - 2 p[i] + p[i+1]|^2`
//! - curvature: `w_curve * (k - k_max)^2` where the turn curvature `k`
//!   exceeds `k_max`
//! - fidelity: `w_dist * |p[i] - p0[i]|^2`
//! - obstacle cost: `w_cost * c(p[i])^2` with `c` the bilinearly
//!   interpolated, normalized costmap cost
//!
//! The solver is a bounded-step gradient descent on central finite
//! differences. Each call is independent: nothing is kept between paths.

use std::time::{Duration, Instant};

use log::{debug, trace};
use nalgebra::Vector2;
use serde::Deserialize;

use crate::common::{PathOptimizer, PlannerError, PlannerResult};
use crate::mapping::Costmap2D;

/// Finite-difference step [m]
const GRADIENT_STEP: f64 = 1e-4;
/// Fractions of the maximum step tried on every iteration
const STEP_FRACTIONS: [f64; 6] = [1.0, 0.5, 0.25, 0.1, 0.05, 0.01];

/// Solver limits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    pub max_iterations: usize,
    /// Wall-clock budget per solve [s], `<= 0` for none
    pub max_time: f64,
    /// Stop when the relative cost decrease falls below this
    pub fn_tolerance: f64,
    /// Stop when the largest point gradient norm falls below this
    pub gradient_tolerance: f64,
    /// Largest distance any point moves in one iteration [m]
    pub max_step: f64,
    /// Re-solves allowed after pinning points that ended in collision
    pub max_anchor_attempts: usize,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_time: 0.1,
            fn_tolerance: 1e-7,
            gradient_tolerance: 1e-10,
            max_step: 0.1,
            max_anchor_attempts: 5,
        }
    }
}

impl OptimizerParams {
    fn time_budget(&self) -> Option<Duration> {
        if self.max_time > 0.0 && self.max_time.is_finite() {
            Some(Duration::from_secs_f64(self.max_time))
        } else {
            None
        }
    }
}

/// Cost weights shared by the smoother and the upsampler
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmootherParams {
    pub smooth_weight: f64,
    pub costmap_weight: f64,
    pub distance_weight: f64,
    pub curvature_weight: f64,
    /// Curvature above which the curvature term applies [1/m].
    /// Filled from the minimum turning radius when unset.
    pub max_curvature: Option<f64>,
    pub upsampling_ratio: usize,
    pub optimizer: OptimizerParams,
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self {
            smooth_weight: 0.3,
            costmap_weight: 0.5,
            distance_weight: 0.1,
            curvature_weight: 0.5,
            max_curvature: None,
            upsampling_ratio: 2,
            optimizer: OptimizerParams::default(),
        }
    }
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    FunctionTolerance,
    GradientTolerance,
    /// No tried step lowered the cost
    Stalled,
    MaxIterations,
    MaxTime,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub points: Vec<Vector2<f64>>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Weighted cost over a path, relative to the path it started from
pub(crate) struct CostFunction<'a> {
    reference: &'a [Vector2<f64>],
    fixed: &'a [bool],
    smooth_weight: f64,
    costmap_weight: f64,
    distance_weight: f64,
    curvature_weight: f64,
    max_curvature: f64,
    costmap: Option<&'a Costmap2D>,
}

impl<'a> CostFunction<'a> {
    pub(crate) fn new(
        reference: &'a [Vector2<f64>],
        fixed: &'a [bool],
        params: &SmootherParams,
        costmap: Option<&'a Costmap2D>,
    ) -> Self {
        Self {
            reference,
            fixed,
            smooth_weight: params.smooth_weight,
            costmap_weight: if costmap.is_some() { params.costmap_weight } else { 0.0 },
            distance_weight: params.distance_weight,
            curvature_weight: params.curvature_weight,
            max_curvature: params.max_curvature.unwrap_or(f64::INFINITY),
            costmap,
        }
    }

    /// Keep only the smoothness and curvature terms
    pub(crate) fn shape_only(mut self) -> Self {
        self.costmap_weight = 0.0;
        self.distance_weight = 0.0;
        self.costmap = None;
        self
    }

    /// Smoothness and curvature at interior point `j`
    fn shape_cost(&self, points: &[Vector2<f64>], j: usize) -> f64 {
        let (prev, curr, next) = (points[j - 1], points[j], points[j + 1]);
        let residual = prev - 2.0 * curr + next;
        let mut cost = self.smooth_weight * residual.norm_squared();

        if self.curvature_weight > 0.0 && self.max_curvature.is_finite() {
            let incoming = curr - prev;
            let outgoing = next - curr;
            let (n_in, n_out) = (incoming.norm(), outgoing.norm());
            if n_in > 1e-9 && n_out > 1e-9 {
                let turn = (incoming.dot(&outgoing) / (n_in * n_out)).clamp(-1.0, 1.0).acos();
                let curvature = turn / n_in;
                if curvature > self.max_curvature {
                    cost += self.curvature_weight * (curvature - self.max_curvature).powi(2);
                }
            }
        }
        cost
    }

    /// Fidelity and obstacle cost of point `i`
    fn point_cost(&self, points: &[Vector2<f64>], i: usize) -> f64 {
        let p = points[i];
        let mut cost = self.distance_weight * (p - self.reference[i]).norm_squared();
        if let Some(costmap) = self.costmap {
            let c = costmap.interpolated_cost(p.x, p.y);
            cost += self.costmap_weight * c * c;
        }
        cost
    }

    pub(crate) fn total(&self, points: &[Vector2<f64>]) -> f64 {
        let n = points.len();
        let shape: f64 = (1..n.saturating_sub(1)).map(|j| self.shape_cost(points, j)).sum();
        let point: f64 = (0..n).map(|i| self.point_cost(points, i)).sum();
        shape + point
    }

    /// Every term that depends on point `i`
    fn local(&self, points: &[Vector2<f64>], i: usize) -> f64 {
        let n = points.len();
        let lo = i.saturating_sub(1).max(1);
        let hi = (i + 1).min(n.saturating_sub(2));
        let shape: f64 = (lo..=hi).map(|j| self.shape_cost(points, j)).sum();
        shape + self.point_cost(points, i)
    }

    fn gradient(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        let mut shifted = points.to_vec();
        let mut gradient = vec![Vector2::zeros(); points.len()];
        for i in 0..points.len() {
            if self.fixed[i] {
                continue;
            }
            for axis in 0..2 {
                let value = points[i][axis];
                shifted[i][axis] = value + GRADIENT_STEP;
                let plus = self.local(&shifted, i);
                shifted[i][axis] = value - GRADIENT_STEP;
                let minus = self.local(&shifted, i);
                shifted[i][axis] = value;
                gradient[i][axis] = (plus - minus) / (2.0 * GRADIENT_STEP);
            }
        }
        gradient
    }
}

/// Minimize `problem` starting from `initial`
pub(crate) fn minimize(
    problem: &CostFunction<'_>,
    initial: Vec<Vector2<f64>>,
    params: &OptimizerParams,
) -> PlannerResult<Solution> {
    let started = Instant::now();
    let budget = params.time_budget();
    let initial_cost = problem.total(&initial);
    if !initial_cost.is_finite() {
        return Err(PlannerError::Optimization(
            "initial path cost is not finite".to_string(),
        ));
    }

    let mut points = initial;
    let mut cost = initial_cost;
    let mut iterations = 0;
    let mut termination = Termination::MaxIterations;

    while iterations < params.max_iterations {
        if budget.map_or(false, |limit| started.elapsed() > limit) {
            termination = Termination::MaxTime;
            break;
        }

        let gradient = problem.gradient(&points);
        let largest = gradient.iter().map(|g| g.norm()).fold(0.0, f64::max);
        if !largest.is_finite() {
            return Err(PlannerError::Optimization(
                "cost gradient is not finite".to_string(),
            ));
        }
        if largest < params.gradient_tolerance {
            termination = Termination::GradientTolerance;
            break;
        }

        let scale = params.max_step / largest;
        let mut best: Option<(f64, Vec<Vector2<f64>>)> = None;
        for fraction in STEP_FRACTIONS {
            let step = fraction * scale;
            let candidate: Vec<Vector2<f64>> = points
                .iter()
                .zip(&gradient)
                .map(|(p, g)| p - g * step)
                .collect();
            let candidate_cost = problem.total(&candidate);
            if best.as_ref().map_or(true, |(c, _)| candidate_cost < *c) {
                best = Some((candidate_cost, candidate));
            }
        }

        let (next_cost, next_points) = match best {
            Some((c, p)) if c < cost => (c, p),
            _ => {
                termination = Termination::Stalled;
                break;
            }
        };
        iterations += 1;

        let decrease = (cost - next_cost) / cost.max(f64::EPSILON);
        trace!("iteration {}: cost {:.6e} -> {:.6e}", iterations, cost, next_cost);
        points = next_points;
        cost = next_cost;
        if decrease < params.fn_tolerance {
            termination = Termination::FunctionTolerance;
            break;
        }
    }

    if !cost.is_finite() || cost > initial_cost {
        return Err(PlannerError::Optimization(format!(
            "solver ended with cost {} from {}",
            cost, initial_cost
        )));
    }

    Ok(Solution {
        points,
        initial_cost,
        final_cost: cost,
        iterations,
        termination,
    })
}

/// Gradient-descent smoother with collision re-anchoring
#[derive(Debug, Clone)]
pub struct Smoother {
    allow_unknown: bool,
}

impl Smoother {
    pub fn new(allow_unknown: bool) -> Self {
        Self { allow_unknown }
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PathOptimizer for Smoother {
    /// Endpoints stay fixed. Points that end up in collision are pinned to
    /// their raw position and the solve restarts from the raw path.
    fn smooth(
        &self,
        path: &[Vector2<f64>],
        costmap: &Costmap2D,
        params: &SmootherParams,
    ) -> PlannerResult<Vec<Vector2<f64>>> {
        let n = path.len();
        if n < 3 {
            return Err(PlannerError::Optimization(format!(
                "smoothing needs at least 3 points, got {}",
                n
            )));
        }

        let mut fixed = vec![false; n];
        fixed[0] = true;
        fixed[n - 1] = true;

        for attempt in 0..=params.optimizer.max_anchor_attempts {
            let problem = CostFunction::new(path, &fixed, params, Some(costmap));
            let solution = minimize(&problem, path.to_vec(), &params.optimizer)?;
            debug!(
                "Smoother attempt {}: cost {:.4e} -> {:.4e} in {} iterations ({:?})",
                attempt,
                solution.initial_cost,
                solution.final_cost,
                solution.iterations,
                solution.termination
            );

            let colliding: Vec<usize> = solution
                .points
                .iter()
                .enumerate()
                .filter(|(i, p)| !fixed[*i] && costmap.is_collision(p.x, p.y, self.allow_unknown))
                .map(|(i, _)| i)
                .collect();
            if colliding.is_empty() {
                return Ok(solution.points);
            }

            debug!("Re-anchoring {} colliding points: {:?}", colliding.len(), colliding);
            for i in colliding {
                fixed[i] = true;
            }
        }

        Err(PlannerError::Optimization(format!(
            "smoothed path still in collision after {} re-anchoring attempts",
            params.optimizer.max_anchor_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::costs;

    fn test_params() -> SmootherParams {
        SmootherParams {
            smooth_weight: 0.3,
            costmap_weight: 0.5,
            distance_weight: 0.1,
            curvature_weight: 0.5,
            max_curvature: Some(1.0),
            upsampling_ratio: 2,
            optimizer: OptimizerParams {
                max_iterations: 100,
                max_time: 0.0,
                fn_tolerance: 1e-6,
                gradient_tolerance: 1e-8,
                max_step: 0.1,
                max_anchor_attempts: 5,
            },
        }
    }

    fn roughness(points: &[Vector2<f64>]) -> f64 {
        points
            .windows(3)
            .map(|w| (w[0] - 2.0 * w[1] + w[2]).norm_squared())
            .sum()
    }

    /// 20x20 map at 1 m with a lethal block covering x 4..=14, y 2..=14
    fn block_costmap() -> Costmap2D {
        let mut costmap = Costmap2D::new(20, 20, 1.0, 0.0, 0.0, costs::FREE_SPACE).unwrap();
        costmap.fill_rect(4, 2, 14, 14, costs::OCCUPIED);
        costmap
    }

    /// Path hugging the block on its left and top sides, every 4th cell kept
    fn hugging_path() -> Vec<Vector2<f64>> {
        let cells: Vec<Vector2<f64>> = (0..13)
            .map(|i| Vector2::new(3.5, 2.5 + i as f64))
            .chain((1..13).map(|i| Vector2::new(3.5 + i as f64, 15.5)))
            .collect();
        let mut path: Vec<Vector2<f64>> = cells.iter().step_by(4).copied().collect();
        path.push(cells[cells.len() - 1]);
        path
    }

    #[test]
    fn test_defaults() {
        let params = SmootherParams::default();
        assert_eq!(params.upsampling_ratio, 2);
        assert_eq!(params.max_curvature, None);
        assert_eq!(params.optimizer.max_iterations, 100);
        assert_eq!(params.optimizer.max_anchor_attempts, 5);
    }

    #[test]
    fn test_smooths_zigzag() {
        let costmap = Costmap2D::new(20, 20, 1.0, -5.0, -5.0, costs::FREE_SPACE).unwrap();
        let path: Vec<Vector2<f64>> = (0..10)
            .map(|i| Vector2::new(i as f64, (i % 2) as f64))
            .collect();

        let smoothed = Smoother::default().smooth(&path, &costmap, &test_params()).unwrap();
        assert_eq!(smoothed.len(), path.len());
        assert_eq!(smoothed[0], path[0]);
        assert_eq!(smoothed[9], path[9]);
        assert!(roughness(&smoothed) < roughness(&path) / 10.0);
    }

    #[test]
    fn test_too_short_path_fails() {
        let costmap = Costmap2D::new(5, 5, 1.0, 0.0, 0.0, costs::FREE_SPACE).unwrap();
        let path = vec![Vector2::new(0.5, 0.5), Vector2::new(1.5, 1.5)];
        let err = Smoother::default().smooth(&path, &costmap, &test_params()).unwrap_err();
        assert!(matches!(err, PlannerError::Optimization(_)));
    }

    #[test]
    fn test_non_finite_path_fails() {
        let costmap = Costmap2D::new(5, 5, 1.0, 0.0, 0.0, costs::FREE_SPACE).unwrap();
        let path = vec![
            Vector2::new(0.5, 0.5),
            Vector2::new(f64::NAN, 1.5),
            Vector2::new(2.5, 2.5),
        ];
        assert!(Smoother::default().smooth(&path, &costmap, &test_params()).is_err());
    }

    #[test]
    fn test_re_anchoring_clears_collisions() {
        let costmap = block_costmap();
        let path = hugging_path();
        let mut params = test_params();
        params.distance_weight = 0.0;

        let smoothed = Smoother::default().smooth(&path, &costmap, &params).unwrap();
        assert_eq!(smoothed.len(), path.len());
        assert_eq!(smoothed[0], path[0]);
        assert_eq!(*smoothed.last().unwrap(), *path.last().unwrap());
        for p in &smoothed {
            assert!(!costmap.is_collision(p.x, p.y, true), "{:?} in collision", p);
        }
    }

    #[test]
    fn test_persistent_collision_is_failure() {
        let costmap = block_costmap();
        let path = hugging_path();
        let mut params = test_params();
        params.distance_weight = 0.0;
        params.optimizer.max_anchor_attempts = 0;

        let err = Smoother::default().smooth(&path, &costmap, &params).unwrap_err();
        assert!(matches!(err, PlannerError::Optimization(_)));
    }

    #[test]
    fn test_straight_line_is_stationary() {
        let path: Vec<Vector2<f64>> = (0..5).map(|i| Vector2::new(i as f64, 0.0)).collect();
        let fixed = vec![true, false, false, false, true];
        let problem = CostFunction::new(&path, &fixed, &test_params(), None);
        let solution = minimize(&problem, path.clone(), &test_params().optimizer).unwrap();
        assert_eq!(solution.termination, Termination::GradientTolerance);
        assert_eq!(solution.iterations, 0);
        for (a, b) in solution.points.iter().zip(&path) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn test_curvature_term_only_above_limit() {
        let path = vec![Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0), Vector2::new(1.0, 1.0)];
        let fixed = vec![true; 3];
        let mut params = test_params();
        params.smooth_weight = 0.0;
        params.distance_weight = 0.0;

        // 90 degree turn over 1 m: curvature pi/2
        params.max_curvature = Some(1.0);
        let cost = CostFunction::new(&path, &fixed, &params, None).total(&path);
        let expected = 0.5 * (std::f64::consts::FRAC_PI_2 - 1.0).powi(2);
        assert!((cost - expected).abs() < 1e-9);

        params.max_curvature = Some(2.0);
        assert_eq!(CostFunction::new(&path, &fixed, &params, None).total(&path), 0.0);
    }

    #[test]
    fn test_costmap_pushes_points_to_cheaper_cells() {
        // High but passable cost row just below the middle of the path
        let mut costmap = Costmap2D::new(20, 20, 1.0, 0.0, 0.0, costs::FREE_SPACE).unwrap();
        costmap.fill_rect(8, 10, 12, 10, 200);
        let path: Vec<Vector2<f64>> = (0..5)
            .map(|i| Vector2::new(2.0 + 4.0 * i as f64, 10.6))
            .collect();
        let mut params = test_params();
        params.costmap_weight = 5.0;

        let smoothed = Smoother::default().smooth(&path, &costmap, &params).unwrap();
        let before = costmap.interpolated_cost(path[2].x, path[2].y);
        let after = costmap.interpolated_cost(smoothed[2].x, smoothed[2].y);
        assert!(after < before, "{} !< {}", after, before);
    }
}
