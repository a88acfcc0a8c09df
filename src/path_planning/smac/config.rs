//! Planner configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! tolerance = 0.125
//! motion_model_for_search = "REEDS_SHEPP"
//! minimum_turning_radius = 0.5
//!
//! [smoother]
//! smooth_weight = 0.3
//! upsampling_ratio = 4
//!
//! [smoother.optimizer]
//! max_iterations = 200
//! ```

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::common::{PlannerError, PlannerResult};

use super::a_star::SearchParams;
use super::motion_model::{resolve_motion_model, MotionModel, MotionModelChoice};
use super::smoother::SmootherParams;

/// Upsampling ratios the upsampler is tuned for
pub const VALID_UPSAMPLING_RATIOS: [usize; 2] = [2, 4];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Goal acceptance radius [m]
    pub tolerance: f64,
    pub downsample_costmap: bool,
    pub downsampling_factor: usize,
    pub angle_quantization_bins: usize,
    pub allow_unknown: bool,
    /// `<= 0` for unbounded
    pub max_iterations: i64,
    /// `<= 0` for unbounded
    pub max_on_approach_iterations: i64,
    /// [s], `<= 0` for unbounded
    pub max_planning_time: f64,
    pub travel_cost_scale: f64,
    pub smooth_path: bool,
    pub upsample_path: bool,
    /// [m]
    pub minimum_turning_radius: f64,
    pub motion_model_for_search: String,
    pub smoother: SmootherParams,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.125,
            downsample_costmap: false,
            downsampling_factor: 1,
            angle_quantization_bins: 72,
            allow_unknown: true,
            max_iterations: -1,
            max_on_approach_iterations: -1,
            max_planning_time: -1.0,
            travel_cost_scale: 0.8,
            smooth_path: true,
            upsample_path: false,
            minimum_turning_radius: 0.4,
            motion_model_for_search: MotionModel::Dubin.as_str().to_string(),
            smoother: SmootherParams::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_toml_str(content: &str) -> PlannerResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the planner cannot run with
    pub fn validate(&self) -> PlannerResult<()> {
        if !(0.0..=1.0).contains(&self.travel_cost_scale) {
            return Err(PlannerError::Configuration(format!(
                "travel_cost_scale must be between 0 and 1, got {}",
                self.travel_cost_scale
            )));
        }
        if self.angle_quantization_bins == 0 {
            return Err(PlannerError::Configuration(
                "angle_quantization_bins must be at least 1".to_string(),
            ));
        }
        if self.downsample_costmap && self.downsampling_factor == 0 {
            return Err(PlannerError::Configuration(
                "downsampling_factor must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(PlannerError::Configuration(format!(
                "tolerance must be a non-negative distance, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Factor the costmap is coarsened by, 1 when downsampling is off
    pub fn effective_downsampling_factor(&self) -> usize {
        if self.downsample_costmap {
            self.downsampling_factor.max(1)
        } else {
            1
        }
    }

    /// Configured motion model, degrading unknown names with a warning
    pub fn motion_model(&self) -> MotionModel {
        match resolve_motion_model(&self.motion_model_for_search) {
            MotionModelChoice::Recognized(model) => model,
            MotionModelChoice::Fallback { requested, fallback } => {
                warn!(
                    "Unable to get MotionModel search type '{}'. Given '{}', valid options are \
                     MOORE, VON_NEUMANN, DUBIN, REEDS_SHEPP, BALKCOM_MASON",
                    requested, fallback
                );
                fallback
            }
        }
    }

    /// Configured upsampling ratio, replaced by 2 when unsupported
    pub fn upsampling_ratio(&self) -> usize {
        let ratio = self.smoother.upsampling_ratio;
        if VALID_UPSAMPLING_RATIOS.contains(&ratio) {
            ratio
        } else {
            warn!(
                "Upsample ratio set to {}, only 2 and 4 are valid. Defaulting to 2.",
                ratio
            );
            2
        }
    }

    /// Search limits with `<= 0` values mapped to unbounded
    pub fn search_params(&self) -> SearchParams {
        if self.max_iterations <= 0 {
            info!("No maximum iterations set, searching until the open set is exhausted");
        }
        if self.max_on_approach_iterations <= 0 {
            info!(
                "On approach iteration selected as <= 0, \
                 disabling tolerance and on approach iterations"
            );
        }
        SearchParams::new(
            self.travel_cost_scale,
            self.allow_unknown,
            self.max_iterations,
            self.max_on_approach_iterations,
            self.max_planning_time,
        )
    }

    /// Smoother weights with the curvature limit filled from the turning radius
    pub fn smoother_params(&self) -> SmootherParams {
        let mut params = self.smoother.clone();
        if params.max_curvature.is_none() && self.minimum_turning_radius > 0.0 {
            params.max_curvature = Some(1.0 / self.minimum_turning_radius);
        }
        params
    }
}
