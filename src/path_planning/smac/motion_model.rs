//! Motion models for SE2 lattice search
//!
//! Each model is a fixed set of motion primitives: relative pose offsets,
//! expressed in the body frame of the node being expanded, in continuous
//! grid coordinates (cells) and heading bins. The table is computed once per
//! planner configuration and shared read-only between searches.
//!
//! References:
//! - Dubins car: http://planning.cs.uiuc.edu/node821.html
//! - Reeds-Shepp car: http://planning.cs.uiuc.edu/node822.html
//! - Balkcom-Mason differential drive: http://planning.cs.uiuc.edu/node823.html

use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::str::FromStr;

use crate::common::{PlannerError, PlannerResult};

/// Vehicle kinematic class used to build the primitive set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionModel {
    /// 2D 4-connected grid search, not usable for SE2 search
    VonNeumann,
    /// 2D 8-connected grid search, not usable for SE2 search
    Moore,
    /// Ackermann, forward only, minimum turning radius
    Dubin,
    /// Ackermann, forward and reverse, minimum turning radius
    ReedsShepp,
    /// Differential drive or omnidirectional, may spin in place
    BalkcomMason,
}

impl MotionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionModel::VonNeumann => "VON_NEUMANN",
            MotionModel::Moore => "MOORE",
            MotionModel::Dubin => "DUBIN",
            MotionModel::ReedsShepp => "REEDS_SHEPP",
            MotionModel::BalkcomMason => "BALKCOM_MASON",
        }
    }

    /// Whether primitives depend on a minimum turning radius
    pub fn is_curvature_constrained(&self) -> bool {
        matches!(self, MotionModel::Dubin | MotionModel::ReedsShepp)
    }
}

impl fmt::Display for MotionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotionModel {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "VON_NEUMANN" => Ok(MotionModel::VonNeumann),
            "MOORE" => Ok(MotionModel::Moore),
            "DUBIN" | "DUBINS" | "ACKERMANN" => Ok(MotionModel::Dubin),
            "REEDS_SHEPP" | "ACKERMANN_REVERSE" => Ok(MotionModel::ReedsShepp),
            "BALKCOM_MASON" | "DIFFERENTIAL" | "OMNI" => Ok(MotionModel::BalkcomMason),
            _ => Err(PlannerError::Configuration(format!(
                "unknown motion model '{}', valid options are MOORE, VON_NEUMANN, DUBIN, \
                 REEDS_SHEPP, BALKCOM_MASON",
                s
            ))),
        }
    }
}

/// Model used when the configured name is not recognized
pub const FALLBACK_MOTION_MODEL: MotionModel = MotionModel::Dubin;

/// Result of resolving a configured motion model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionModelChoice {
    Recognized(MotionModel),
    /// The name was not recognized; `fallback` is used instead
    Fallback {
        requested: String,
        fallback: MotionModel,
    },
}

impl MotionModelChoice {
    pub fn model(&self) -> MotionModel {
        match self {
            MotionModelChoice::Recognized(model) => *model,
            MotionModelChoice::Fallback { fallback, .. } => *fallback,
        }
    }
}

/// Resolve a configured name, degrading unknown names to [`FALLBACK_MOTION_MODEL`]
pub fn resolve_motion_model(name: &str) -> MotionModelChoice {
    match name.parse::<MotionModel>() {
        Ok(model) => MotionModelChoice::Recognized(model),
        Err(_) => MotionModelChoice::Fallback {
            requested: name.to_string(),
            fallback: FALLBACK_MOTION_MODEL,
        },
    }
}

/// One admissible move relative to the current pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPrimitive {
    /// Forward offset in the body frame [cells]
    pub dx: f64,
    /// Leftward offset in the body frame [cells]
    pub dy: f64,
    /// Heading change [bins]
    pub dtheta: f64,
    /// Distance travelled, used as the base traversal cost [cells]
    pub travel_length: f64,
}

impl MotionPrimitive {
    fn new(dx: f64, dy: f64, dtheta: f64, travel_length: f64) -> Self {
        Self { dx, dy, dtheta, travel_length }
    }

    /// Straight-line distance between the primitive's endpoints
    pub fn chord_length(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }
}

/// Precomputed primitive set for one planner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MotionTable {
    motion_model: MotionModel,
    num_angle_quantization: usize,
    bin_size: f64,
    min_turning_radius: f64,
    projections: Vec<MotionPrimitive>,
}

impl MotionTable {
    /// Build the primitive set.
    ///
    /// `min_turning_radius` is in grid cells and ignored by `BalkcomMason`.
    pub fn new(
        motion_model: MotionModel,
        num_angle_quantization: usize,
        min_turning_radius: f64,
    ) -> PlannerResult<Self> {
        if num_angle_quantization == 0 {
            return Err(PlannerError::Configuration(
                "angle quantization must have at least one bin".to_string(),
            ));
        }
        let bin_size = 2.0 * PI / num_angle_quantization as f64;

        let projections = match motion_model {
            MotionModel::Dubin | MotionModel::ReedsShepp => {
                if !(min_turning_radius.is_finite() && min_turning_radius > 0.0) {
                    return Err(PlannerError::Configuration(format!(
                        "minimum turning radius must be positive for {}, got {}",
                        motion_model, min_turning_radius
                    )));
                }
                let arc = ArcGeometry::new(min_turning_radius, bin_size);
                if motion_model == MotionModel::Dubin {
                    Self::dubin(&arc)
                } else {
                    Self::reeds_shepp(&arc)
                }
            }
            MotionModel::BalkcomMason => Self::balkcom_mason(bin_size),
            MotionModel::Moore | MotionModel::VonNeumann => {
                return Err(PlannerError::Configuration(format!(
                    "invalid motion model {} for SE2 search, select between DUBIN (Ackermann \
                     forward only), REEDS_SHEPP (Ackermann forward and back), or BALKCOM_MASON \
                     (differential drive and omnidirectional)",
                    motion_model
                )));
            }
        };

        Ok(Self {
            motion_model,
            num_angle_quantization,
            bin_size,
            min_turning_radius,
            projections,
        })
    }

    fn dubin(arc: &ArcGeometry) -> Vec<MotionPrimitive> {
        vec![
            MotionPrimitive::new(SQRT_2, 0.0, 0.0, SQRT_2), // Forward
            MotionPrimitive::new(arc.dx, arc.dy, arc.bins, arc.length), // Left
            MotionPrimitive::new(arc.dx, -arc.dy, -arc.bins, arc.length), // Right
        ]
    }

    fn reeds_shepp(arc: &ArcGeometry) -> Vec<MotionPrimitive> {
        let mut projections = Self::dubin(arc);
        projections.extend([
            MotionPrimitive::new(-SQRT_2, 0.0, 0.0, SQRT_2), // Backward
            MotionPrimitive::new(-arc.dx, arc.dy, -arc.bins, arc.length), // Backward + Left
            MotionPrimitive::new(-arc.dx, -arc.dy, arc.bins, arc.length), // Backward + Right
        ]);
        projections
    }

    // Not a pure Balkcom-Mason model, but the base can move forward and back,
    // spin in place, and rotate while moving.
    fn balkcom_mason(bin_size: f64) -> Vec<MotionPrimitive> {
        vec![
            MotionPrimitive::new(SQRT_2, 0.0, 0.0, SQRT_2), // Forward
            MotionPrimitive::new(-SQRT_2, 0.0, 0.0, SQRT_2), // Backward
            MotionPrimitive::new(0.0, 0.0, 1.0, bin_size), // Spin left
            MotionPrimitive::new(0.0, 0.0, -1.0, bin_size), // Spin right
            MotionPrimitive::new(SQRT_2, 0.0, 1.0, SQRT_2), // Spin left + Forward
            MotionPrimitive::new(-SQRT_2, 0.0, 1.0, SQRT_2), // Spin left + Backward
            MotionPrimitive::new(SQRT_2, 0.0, -1.0, SQRT_2), // Spin right + Forward
            MotionPrimitive::new(-SQRT_2, 0.0, -1.0, SQRT_2), // Spin right + Backward
        ]
    }

    pub fn motion_model(&self) -> MotionModel {
        self.motion_model
    }

    pub fn num_angle_quantization(&self) -> usize {
        self.num_angle_quantization
    }

    /// Heading bin width [rad]
    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    /// Minimum turning radius [cells]
    pub fn min_turning_radius(&self) -> f64 {
        self.min_turning_radius
    }

    pub fn projections(&self) -> &[MotionPrimitive] {
        &self.projections
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

/// Arc primitive on the minimum turning circle.
///
/// The angle must be an increment of the bin size, its chord must be at least
/// sqrt(2) to leave the current cell, and it must respect the minimum turning
/// radius. From chord >= sqrt(2) = 2 R sin(angle / 2) the smallest admissible
/// angle is 2 asin(sqrt(2) / 2R), rounded up to a whole number of bins.
struct ArcGeometry {
    dx: f64,
    dy: f64,
    bins: f64,
    length: f64,
}

impl ArcGeometry {
    fn new(radius: f64, bin_size: f64) -> Self {
        let min_angle = 2.0 * (SQRT_2 / (2.0 * radius)).min(1.0).asin();
        // Guard against asin round-off turning an exact multiple into one extra bin
        let increments = ((min_angle / bin_size) - 1e-9).ceil().max(1.0);
        let angle = increments * bin_size;

        // Right triangle on the turning circle: the chord spans
        // R sin(angle) forward and R (1 - cos(angle)) sideways
        Self {
            dx: radius * angle.sin(),
            dy: radius * (1.0 - angle.cos()),
            bins: increments,
            length: radius * angle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("DUBIN".parse::<MotionModel>().unwrap(), MotionModel::Dubin);
        assert_eq!("reeds-shepp".parse::<MotionModel>().unwrap(), MotionModel::ReedsShepp);
        assert_eq!(" balkcom_mason ".parse::<MotionModel>().unwrap(), MotionModel::BalkcomMason);
        assert_eq!("MOORE".parse::<MotionModel>().unwrap(), MotionModel::Moore);
        assert!("HOVERCRAFT".parse::<MotionModel>().is_err());
    }

    #[test]
    fn test_unrecognized_name_falls_back() {
        let choice = resolve_motion_model("HOVERCRAFT");
        assert_eq!(
            choice,
            MotionModelChoice::Fallback {
                requested: "HOVERCRAFT".to_string(),
                fallback: MotionModel::Dubin,
            }
        );
        assert_eq!(choice.model(), MotionModel::Dubin);
        assert_eq!(
            resolve_motion_model("REEDS_SHEPP"),
            MotionModelChoice::Recognized(MotionModel::ReedsShepp)
        );
    }

    #[test]
    fn test_primitive_counts() {
        let dubin = MotionTable::new(MotionModel::Dubin, 72, 4.0).unwrap();
        let reeds_shepp = MotionTable::new(MotionModel::ReedsShepp, 72, 4.0).unwrap();
        let balkcom_mason = MotionTable::new(MotionModel::BalkcomMason, 72, 4.0).unwrap();
        assert_eq!(dubin.len(), 3);
        assert_eq!(reeds_shepp.len(), 6);
        assert_eq!(balkcom_mason.len(), 8);
    }

    #[test]
    fn test_grid_models_are_invalid_for_se2() {
        let err = MotionTable::new(MotionModel::Moore, 72, 4.0).unwrap_err();
        assert!(err.is_configuration());
        assert!(MotionTable::new(MotionModel::VonNeumann, 72, 4.0).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(MotionTable::new(MotionModel::Dubin, 0, 4.0).is_err());
        assert!(MotionTable::new(MotionModel::Dubin, 72, 0.0).is_err());
        assert!(MotionTable::new(MotionModel::ReedsShepp, 72, f64::NAN).is_err());
        // Unconstrained model has no turning radius dependency
        assert!(MotionTable::new(MotionModel::BalkcomMason, 72, 0.0).is_ok());
    }

    #[test]
    fn test_curvature_primitives_leave_cell_on_bin_multiples() {
        for &bins in &[8usize, 16, 36, 72, 180] {
            for &radius in &[1.0, 1.5, 2.0, 4.0, 8.0, 20.0] {
                let table = MotionTable::new(MotionModel::ReedsShepp, bins, radius).unwrap();
                for p in table.projections() {
                    assert!(
                        p.chord_length() >= SQRT_2 - 1e-9,
                        "chord {} too short for bins={} radius={}",
                        p.chord_length(), bins, radius
                    );
                    let rounded = p.dtheta.round();
                    assert!((p.dtheta - rounded).abs() < 1e-12);
                    assert!(p.travel_length >= p.chord_length() - 1e-9);
                }
                let left = table.projections()[1];
                assert!(left.dtheta >= 1.0);
                // Not smaller than the angle implied by the turning radius
                let min_angle = 2.0 * (SQRT_2 / (2.0 * radius)).min(1.0).asin();
                assert!(left.dtheta * table.bin_size() >= min_angle - 1e-9);
                // Smallest such multiple
                assert!((left.dtheta - 1.0) * table.bin_size() < min_angle);
            }
        }
    }

    #[test]
    fn test_dubin_geometry_is_deterministic() {
        let a = MotionTable::new(MotionModel::Dubin, 72, 5.0).unwrap();
        let b = MotionTable::new(MotionModel::Dubin, 72, 5.0).unwrap();
        assert_eq!(a, b);

        let left = a.projections()[1];
        let right = a.projections()[2];
        let angle = left.dtheta * a.bin_size();
        assert!((left.dx - 5.0 * angle.sin()).abs() < 1e-12);
        assert!((left.dy - 5.0 * (1.0 - angle.cos())).abs() < 1e-12);
        assert!(left.dy > 0.0);
        assert_eq!(right.dx, left.dx);
        assert_eq!(right.dy, -left.dy);
        assert_eq!(right.dtheta, -left.dtheta);
    }

    #[test]
    fn test_reverse_primitives_mirror_forward() {
        let table = MotionTable::new(MotionModel::ReedsShepp, 16, 2.0).unwrap();
        let p = table.projections();
        assert_eq!(p[3].dx, -p[0].dx);
        assert_eq!(p[4].dx, -p[1].dx);
        assert_eq!(p[4].dy, p[1].dy);
        assert_eq!(p[5].dx, -p[2].dx);
        assert_eq!(p[5].dy, p[2].dy);
    }

    #[test]
    fn test_balkcom_mason_steps_one_bin() {
        let table = MotionTable::new(MotionModel::BalkcomMason, 8, 100.0).unwrap();
        assert!((table.bin_size() - PI / 4.0).abs() < 1e-12);
        for p in table.projections() {
            assert!(p.dtheta == 0.0 || p.dtheta.abs() == 1.0);
            assert_eq!(p.dy, 0.0);
        }
        let spins = table.projections().iter().filter(|p| p.dx == 0.0).count();
        assert_eq!(spins, 2);
    }
}
