//! SE2 Lattice Planner Example
//!
//! Plans a Reeds-Shepp path around an L-shaped wall, then smooths and
//! upsamples it. Settings come from `demos/config/smac_planner.toml`.
//!
//! Run with `RUST_LOG=debug` to see per-stage timings.

use std::process;

use log::{error, info, warn};
use se2_planner::common::{GlobalPlanner, Obstacles, Pose2D};
use se2_planner::mapping::Costmap2D;
use se2_planner::path_planning::smac::{PlannerConfig, SmacPlanner};
use se2_planner::utils::Visualizer;

const CONFIG_PATH: &str = "demos/config/smac_planner.toml";

fn main() {
    env_logger::init();
    println!("SE2 lattice planning start!!");

    let config = match PlannerConfig::from_file(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) if e.is_configuration() => {
            error!("Invalid planner configuration in {}: {}", CONFIG_PATH, e);
            process::exit(1);
        }
        Err(e) => {
            warn!("Could not read {} ({}), using defaults", CONFIG_PATH, e);
            PlannerConfig::default()
        }
    };

    // Boundary and an L-shaped wall
    let mut obstacles = Obstacles::new();
    for i in 0..=80 {
        let t = i as f64 * 0.25;
        obstacles.push((t, 0.0).into());
        obstacles.push((t, 20.0).into());
        obstacles.push((0.0, t).into());
        obstacles.push((20.0, t).into());
    }
    for i in 20..=60 {
        obstacles.push((10.0, i as f64 * 0.25).into());
    }
    for i in 20..=48 {
        obstacles.push((i as f64 * 0.25, 15.0).into());
    }

    let costmap = match Costmap2D::from_obstacles(&obstacles, 0.25, 0.5) {
        Ok(costmap) => costmap,
        Err(e) => {
            error!("Failed to build costmap: {}", e);
            process::exit(1);
        }
    };
    info!(
        "Costmap {}x{} cells at {} m",
        costmap.size_in_cells_x(),
        costmap.size_in_cells_y(),
        costmap.resolution()
    );
    let costmap = costmap.into_shared();

    let planner = match SmacPlanner::new("SmacPlanner", config, costmap.clone()) {
        Ok(planner) => planner,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let start = Pose2D::new(2.0, 2.0, 0.0);
    let goal = Pose2D::new(16.0, 18.0, std::f64::consts::FRAC_PI_2);

    let response = match planner.create_plan(start, goal) {
        Ok(response) => response,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Some(failure) = &response.failure {
        println!("Planning failed after {} iterations: {}", response.iterations, failure);
        return;
    }

    println!(
        "Found path in {} iterations: {} search poses, {} final poses \
         (smoothed: {}, upsampled: {})",
        response.iterations,
        response.raw_poses.len(),
        response.poses.len(),
        response.smoothed,
        response.upsampled
    );
    println!("Path length: {:.2} m", response.path().total_length());

    let mut vis = Visualizer::new();
    vis.set_title("SE2 Lattice Planner");
    if let Ok(map) = costmap.read() {
        vis.plot_costmap(&map);
    }
    vis.plot_plan(&response).plot_start(&start).plot_goal(&goal);

    if let Err(e) = std::fs::create_dir_all("img/path_planning") {
        warn!("Could not create output directory: {}", e);
    }
    match vis.save_png("img/path_planning/smac_planner.png", 800, 800) {
        Ok(()) => println!("Plot saved to img/path_planning/smac_planner.png"),
        Err(e) => warn!("Failed to save plot: {}", e),
    }

    println!("SE2 lattice planning finish!!");
}
