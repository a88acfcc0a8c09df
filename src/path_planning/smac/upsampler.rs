//! Path upsampler
//!
//! Densifies a smoothed path by an integer ratio. The input points stay where
//! they are; the inserted points start evenly spaced along each segment and
//! are then pulled onto a smooth curve using only the smoothness and
//! curvature terms of the smoother's cost.

use log::debug;
use nalgebra::Vector2;

use crate::common::{PathUpsampler, PlannerError, PlannerResult};

use super::smoother::{minimize, CostFunction, SmootherParams};

#[derive(Debug, Clone, Default)]
pub struct Upsampler;

impl Upsampler {
    pub fn new() -> Self {
        Self
    }
}

impl PathUpsampler for Upsampler {
    /// Returns `(n - 1) * ratio + 1` points for an `n` point path
    fn upsample(
        &self,
        path: &[Vector2<f64>],
        params: &SmootherParams,
        ratio: usize,
    ) -> PlannerResult<Vec<Vector2<f64>>> {
        if ratio < 2 {
            return Err(PlannerError::InvalidParameter(format!(
                "upsampling ratio must be at least 2, got {}",
                ratio
            )));
        }
        if path.len() < 2 {
            return Err(PlannerError::Optimization(format!(
                "upsampling needs at least 2 points, got {}",
                path.len()
            )));
        }

        let mut dense = Vec::with_capacity((path.len() - 1) * ratio + 1);
        let mut fixed = Vec::with_capacity(dense.capacity());
        for segment in path.windows(2) {
            let (from, to) = (segment[0], segment[1]);
            for k in 0..ratio {
                let t = k as f64 / ratio as f64;
                dense.push(from + (to - from) * t);
                fixed.push(k == 0);
            }
        }
        if let Some(last) = path.last() {
            dense.push(*last);
            fixed.push(true);
        }

        let problem = CostFunction::new(&dense, &fixed, params, None).shape_only();
        let solution = minimize(&problem, dense.clone(), &params.optimizer)?;
        debug!(
            "Upsampled {} -> {} points, cost {:.4e} -> {:.4e} ({:?})",
            path.len(),
            solution.points.len(),
            solution.initial_cost,
            solution.final_cost,
            solution.termination
        );
        Ok(solution.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_length_and_pinned_points() {
        let path = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 1.0),
            Vector2::new(2.0, 2.0),
        ];
        for ratio in [2, 4] {
            let dense = Upsampler::new()
                .upsample(&path, &SmootherParams::default(), ratio)
                .unwrap();
            assert_eq!(dense.len(), (path.len() - 1) * ratio + 1);
            for (i, p) in path.iter().enumerate() {
                assert_eq!(dense[i * ratio], *p);
            }
            assert!(dense.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
        }
    }

    #[test]
    fn test_straight_segment_keeps_midpoints() {
        let path = vec![Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0), Vector2::new(4.0, 0.0)];
        let dense = Upsampler::new()
            .upsample(&path, &SmootherParams::default(), 2)
            .unwrap();
        assert_eq!(dense.len(), 5);
        for (i, p) in dense.iter().enumerate() {
            assert!((p - Vector2::new(i as f64, 0.0)).norm() < 1e-6, "{:?}", p);
        }
    }

    #[test]
    fn test_corner_is_smoothed() {
        let roughness = |points: &[Vector2<f64>]| -> f64 {
            points
                .windows(3)
                .map(|w| (w[0] - 2.0 * w[1] + w[2]).norm_squared())
                .sum()
        };
        let path = vec![Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0), Vector2::new(2.0, 2.0)];
        let dense = Upsampler::new()
            .upsample(&path, &SmootherParams::default(), 2)
            .unwrap();
        let linear = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 1.0),
            Vector2::new(2.0, 2.0),
        ];
        assert!(roughness(&dense) < roughness(&linear) - 0.1);
        assert_eq!(dense[2], Vector2::new(2.0, 0.0));
    }

    #[test]
    fn test_invalid_input() {
        let upsampler = Upsampler::new();
        let params = SmootherParams::default();
        let path = vec![Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0)];
        assert!(matches!(
            upsampler.upsample(&path, &params, 1),
            Err(PlannerError::InvalidParameter(_))
        ));
        assert!(matches!(
            upsampler.upsample(&path[..1], &params, 2),
            Err(PlannerError::Optimization(_))
        ));
    }
}
