//! Costmap downsampler
//!
//! Coarsens a costmap by an integer factor before search. Every coarse cell
//! takes the most severe cost among the fine cells it covers, so a single
//! obstacle cell is never averaged away into a false free corridor.

use itertools::iproduct;
use log::debug;

use crate::common::{PlannerError, PlannerResult};
use crate::mapping::costmap::{costs, Costmap2D};

/// Downsamples costmaps by a fixed factor
#[derive(Debug, Clone, Copy)]
pub struct CostmapDownsampler {
    factor: usize,
}

impl CostmapDownsampler {
    pub fn new(factor: usize) -> PlannerResult<Self> {
        if factor == 0 {
            return Err(PlannerError::Configuration(
                "downsampling factor must be at least 1".to_string(),
            ));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Produce the coarse costmap
    pub fn downsample(&self, costmap: &Costmap2D) -> PlannerResult<Costmap2D> {
        if self.factor == 1 {
            return Ok(costmap.clone());
        }

        let fine_x = costmap.size_in_cells_x();
        let fine_y = costmap.size_in_cells_y();
        let size_x = (fine_x + self.factor - 1) / self.factor;
        let size_y = (fine_y + self.factor - 1) / self.factor;

        let mut coarse = Vec::with_capacity(size_x * size_y);
        for (cy, cx) in iproduct!(0..size_y, 0..size_x) {
            let x_range = cx * self.factor..((cx + 1) * self.factor).min(fine_x);
            let y_range = cy * self.factor..((cy + 1) * self.factor).min(fine_y);
            let worst = iproduct!(y_range, x_range)
                .filter_map(|(my, mx)| costmap.cost(mx, my))
                .max_by_key(|&cost| severity(cost))
                .unwrap_or(costs::FREE_SPACE);
            coarse.push(worst);
        }

        debug!(
            "Downsampled costmap {}x{} -> {}x{} (factor {})",
            fine_x, fine_y, size_x, size_y, self.factor
        );

        Costmap2D::from_costs(
            size_x,
            size_y,
            costmap.resolution() * self.factor as f64,
            costmap.origin_x(),
            costmap.origin_y(),
            coarse,
        )
    }
}

/// Ordering used to pick the worst cost in a block:
/// occupied, then inscribed, then unknown, then ordinary costs by value.
fn severity(cost: u8) -> u16 {
    match cost {
        costs::OCCUPIED => 1003,
        costs::INSCRIBED => 1002,
        costs::UNKNOWN => 1001,
        c => c as u16,
    }
}
