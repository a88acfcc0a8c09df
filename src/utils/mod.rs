//! Utility modules for se2_planner

pub mod visualization;

pub use visualization::{colors, PathStyle, PointStyle, Visualizer};
