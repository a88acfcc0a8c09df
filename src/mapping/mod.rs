// Mapping module: costmap access and coarsening

pub mod costmap;
pub mod costmap_downsampler;

pub use costmap::{costs, Costmap2D, SharedCostmap};
pub use costmap_downsampler::CostmapDownsampler;
