//! 2D costmap used as the planning snapshot
//!
//! Row-major grid of `u8` traversal costs with a world origin and a
//! resolution defining the affine map between cell indices and meters.
//! A handful of cost values are reserved to mark obstacles and unknown space.

use std::sync::{Arc, RwLock};

use nalgebra::DMatrix;

use crate::common::{Obstacles, PlannerError, PlannerResult};

/// Reserved cost values
pub mod costs {
    /// Free space, no traversal penalty
    pub const FREE_SPACE: u8 = 0;
    /// Highest cost a traversable cell can carry
    pub const MAX_NON_OBSTACLE: u8 = 252;
    /// Within the robot's inscribed radius of an obstacle
    pub const INSCRIBED: u8 = 253;
    /// Obstacle, never traversable
    pub const OCCUPIED: u8 = 254;
    /// No information about the cell
    pub const UNKNOWN: u8 = 255;
}

/// Costmap shared between the map owner and planners.
///
/// Planners hold the read guard for the full duration of one planning call.
pub type SharedCostmap = Arc<RwLock<Costmap2D>>;

/// 2D grid of traversal costs
#[derive(Debug, Clone, PartialEq)]
pub struct Costmap2D {
    size_x: usize,
    size_y: usize,
    resolution: f64,
    origin_x: f64,
    origin_y: f64,
    costs: Vec<u8>,
}

impl Costmap2D {
    /// Create a costmap filled with `default_cost`
    pub fn new(
        size_x: usize,
        size_y: usize,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
        default_cost: u8,
    ) -> PlannerResult<Self> {
        Self::from_costs(
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            vec![default_cost; size_x * size_y],
        )
    }

    /// Create a costmap from a row-major cost buffer
    pub fn from_costs(
        size_x: usize,
        size_y: usize,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
        costs: Vec<u8>,
    ) -> PlannerResult<Self> {
        if size_x == 0 || size_y == 0 {
            return Err(PlannerError::InvalidParameter(format!(
                "costmap size must be non-zero, got {}x{}",
                size_x, size_y
            )));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PlannerError::InvalidParameter(format!(
                "costmap resolution must be positive, got {}",
                resolution
            )));
        }
        if costs.len() != size_x * size_y {
            return Err(PlannerError::InvalidParameter(format!(
                "cost buffer holds {} cells, expected {}",
                costs.len(),
                size_x * size_y
            )));
        }

        Ok(Self {
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            costs,
        })
    }

    /// Create a costmap from a matrix indexed `(y, x)`
    pub fn from_matrix(
        matrix: &DMatrix<u8>,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
    ) -> PlannerResult<Self> {
        let (size_y, size_x) = matrix.shape();
        let mut costs = Vec::with_capacity(size_x * size_y);
        for my in 0..size_y {
            for mx in 0..size_x {
                costs.push(matrix[(my, mx)]);
            }
        }
        Self::from_costs(size_x, size_y, resolution, origin_x, origin_y, costs)
    }

    /// Rasterize obstacle points into a costmap covering their bounding box.
    ///
    /// The cell holding an obstacle point is `OCCUPIED`; any other cell whose
    /// centre lies within `robot_radius` of an obstacle is `INSCRIBED`.
    pub fn from_obstacles(
        obstacles: &Obstacles,
        resolution: f64,
        robot_radius: f64,
    ) -> PlannerResult<Self> {
        if obstacles.points.is_empty() {
            return Err(PlannerError::InvalidParameter(
                "cannot size a costmap from an empty obstacle set".to_string(),
            ));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PlannerError::InvalidParameter(format!(
                "costmap resolution must be positive, got {}",
                resolution
            )));
        }

        let min_x = obstacles.points.iter().fold(f64::INFINITY, |a, p| a.min(p.x)).floor();
        let min_y = obstacles.points.iter().fold(f64::INFINITY, |a, p| a.min(p.y)).floor();
        let max_x = obstacles.points.iter().fold(f64::NEG_INFINITY, |a, p| a.max(p.x));
        let max_y = obstacles.points.iter().fold(f64::NEG_INFINITY, |a, p| a.max(p.y));

        let size_x = ((max_x - min_x) / resolution).floor() as usize + 1;
        let size_y = ((max_y - min_y) / resolution).floor() as usize + 1;
        let mut costmap = Self::new(size_x, size_y, resolution, min_x, min_y, costs::FREE_SPACE)?;

        let radius_cells = (robot_radius.max(0.0) / resolution).ceil() as i64;
        for p in &obstacles.points {
            let (ox, oy) = match costmap.world_to_map(p.x, p.y) {
                Some(cell) => cell,
                None => continue,
            };
            for dy in -radius_cells..=radius_cells {
                for dx in -radius_cells..=radius_cells {
                    let mx = ox as i64 + dx;
                    let my = oy as i64 + dy;
                    if mx < 0 || my < 0 || mx >= size_x as i64 || my >= size_y as i64 {
                        continue;
                    }
                    let (wx, wy) = costmap.map_to_world(mx as f64, my as f64);
                    if ((wx - p.x).powi(2) + (wy - p.y).powi(2)).sqrt() > robot_radius {
                        continue;
                    }
                    let index = costmap.index(mx as usize, my as usize);
                    if costmap.costs[index] < costs::INSCRIBED {
                        costmap.costs[index] = costs::INSCRIBED;
                    }
                }
            }
            let index = costmap.index(ox, oy);
            costmap.costs[index] = costs::OCCUPIED;
        }

        Ok(costmap)
    }

    pub fn size_in_cells_x(&self) -> usize {
        self.size_x
    }

    pub fn size_in_cells_y(&self) -> usize {
        self.size_y
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin_x(&self) -> f64 {
        self.origin_x
    }

    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    /// Raw row-major cost buffer
    pub fn char_map(&self) -> &[u8] {
        &self.costs
    }

    pub fn index(&self, mx: usize, my: usize) -> usize {
        my * self.size_x + mx
    }

    /// Cost of a cell; `None` outside the grid
    pub fn cost(&self, mx: usize, my: usize) -> Option<u8> {
        if mx < self.size_x && my < self.size_y {
            Some(self.costs[self.index(mx, my)])
        } else {
            None
        }
    }

    pub fn set_cost(&mut self, mx: usize, my: usize, cost: u8) -> PlannerResult<()> {
        if mx >= self.size_x || my >= self.size_y {
            return Err(PlannerError::InvalidParameter(format!(
                "cell ({}, {}) is outside a {}x{} costmap",
                mx, my, self.size_x, self.size_y
            )));
        }
        let index = self.index(mx, my);
        self.costs[index] = cost;
        Ok(())
    }

    /// Fill an inclusive rectangle of cells, clipped to the grid
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, cost: u8) {
        for my in y0..=y1.min(self.size_y.saturating_sub(1)) {
            for mx in x0..=x1.min(self.size_x.saturating_sub(1)) {
                let index = self.index(mx, my);
                self.costs[index] = cost;
            }
        }
    }

    /// World coordinates to the containing cell, `None` outside the map
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Option<(usize, usize)> {
        if wx < self.origin_x || wy < self.origin_y {
            return None;
        }
        let mx = ((wx - self.origin_x) / self.resolution).floor();
        let my = ((wy - self.origin_y) / self.resolution).floor();
        if mx < self.size_x as f64 && my < self.size_y as f64 {
            Some((mx as usize, my as usize))
        } else {
            None
        }
    }

    /// Map coordinates (fractional allowed) to the world position of the cell centre
    pub fn map_to_world(&self, mx: f64, my: f64) -> (f64, f64) {
        (
            self.origin_x + (mx + 0.5) * self.resolution,
            self.origin_y + (my + 0.5) * self.resolution,
        )
    }

    /// Bilinear interpolation of normalized cell cost at a world position.
    ///
    /// Costs are normalized by `MAX_NON_OBSTACLE`, so lethal and unknown cells
    /// evaluate slightly above 1.0. Positions off the grid clamp to the border.
    pub fn interpolated_cost(&self, wx: f64, wy: f64) -> f64 {
        let gx = (wx - self.origin_x) / self.resolution - 0.5;
        let gy = (wy - self.origin_y) / self.resolution - 0.5;
        let x0 = gx.floor();
        let y0 = gy.floor();
        let tx = gx - x0;
        let ty = gy - y0;

        let sample = |x: f64, y: f64| -> f64 {
            let cx = (x.max(0.0) as usize).min(self.size_x - 1);
            let cy = (y.max(0.0) as usize).min(self.size_y - 1);
            let cost = self.costs[self.index(cx, cy)].min(costs::INSCRIBED);
            cost as f64 / costs::MAX_NON_OBSTACLE as f64
        };

        sample(x0, y0) * (1.0 - tx) * (1.0 - ty)
            + sample(x0 + 1.0, y0) * tx * (1.0 - ty)
            + sample(x0, y0 + 1.0) * (1.0 - tx) * ty
            + sample(x0 + 1.0, y0 + 1.0) * tx * ty
    }

    /// Whether a world position is outside the map or in a non-traversable cell
    pub fn is_collision(&self, wx: f64, wy: f64, allow_unknown: bool) -> bool {
        match self.world_to_map(wx, wy) {
            None => true,
            Some((mx, my)) => match self.costs[self.index(mx, my)] {
                costs::OCCUPIED | costs::INSCRIBED => true,
                costs::UNKNOWN => !allow_unknown,
                _ => false,
            },
        }
    }

    /// Wrap into a lock handle for sharing with planners
    pub fn into_shared(self) -> SharedCostmap {
        Arc::new(RwLock::new(self))
    }
}
