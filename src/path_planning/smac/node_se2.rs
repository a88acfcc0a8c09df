//! SE2 lattice node
//!
//! A node is one (cell, heading bin) state. Its pose is continuous: the
//! position a motion primitive actually reached, which need not be the cell
//! centre. Heading is stored as a bin index.
//!
//! Whole-number coordinates sit on cell centres, so a continuous position
//! belongs to the cell it rounds to. This is the same frame
//! `Costmap2D::map_to_world` converts from.

use crate::mapping::costs;

use super::a_star::{Neighbor, SearchNode};
use super::motion_model::MotionTable;

/// Tolerance applied before rounding a continuous coordinate to a cell
const CELL_EPSILON: f64 = 1e-6;

/// Continuous pose in grid cells, heading in bins
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSE2 {
    parent: Option<usize>,
    cell_cost: u8,
    accumulated_cost: f64,
    index: usize,
    was_visited: bool,
    is_queued: bool,
    pose: Coordinates,
}

impl SearchNode for NodeSE2 {
    type Coordinates = Coordinates;

    fn new(cell_cost: u8, index: usize) -> Self {
        Self {
            parent: None,
            cell_cost,
            accumulated_cost: f64::INFINITY,
            index,
            was_visited: false,
            is_queued: false,
            pose: Coordinates::default(),
        }
    }

    fn reset(&mut self, cell_cost: u8, index: usize) {
        *self = Self::new(cell_cost, index);
    }

    fn index(&self) -> usize {
        self.index
    }

    fn cell_cost(&self) -> u8 {
        self.cell_cost
    }

    fn accumulated_cost(&self) -> f64 {
        self.accumulated_cost
    }

    fn set_accumulated_cost(&mut self, cost: f64) {
        self.accumulated_cost = cost;
    }

    fn parent(&self) -> Option<usize> {
        self.parent
    }

    fn set_parent(&mut self, parent: usize) {
        self.parent = Some(parent);
    }

    fn was_visited(&self) -> bool {
        self.was_visited
    }

    fn visited(&mut self) {
        self.was_visited = true;
    }

    fn is_queued(&self) -> bool {
        self.is_queued
    }

    fn set_queued(&mut self, queued: bool) {
        self.is_queued = queued;
    }

    fn coordinates(&self) -> Coordinates {
        self.pose
    }

    fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.pose = coordinates;
    }

    fn is_node_valid(&self, traverse_unknown: bool) -> bool {
        match self.cell_cost {
            costs::OCCUPIED | costs::INSCRIBED => false,
            costs::UNKNOWN => traverse_unknown,
            _ => true,
        }
    }

    /// Distance weighted by the normalized cell cost:
    /// `travel_length * (1 + scale * cost / 252)`
    fn traversal_cost(&self, travel_length: f64, travel_cost_scale: f64) -> f64 {
        let normalized = f64::from(self.cell_cost.min(costs::MAX_NON_OBSTACLE))
            / f64::from(costs::MAX_NON_OBSTACLE);
        travel_length * (1.0 + travel_cost_scale * normalized)
    }

    /// Straight-line distance in the plane.
    ///
    /// Heading is ignored. Under curvature-constrained models the estimate
    /// knows nothing about the turn needed to match the goal heading, so the
    /// search is not guaranteed to return the cheapest path to a sharply
    /// turned goal.
    fn heuristic_cost(node: &Coordinates, goal: &Coordinates) -> f64 {
        (goal.x - node.x).hypot(goal.y - node.y)
    }

    fn get_index(
        mx: usize,
        my: usize,
        theta: usize,
        size_x: usize,
        num_angle_quantization: usize,
    ) -> usize {
        theta + mx * num_angle_quantization + my * size_x * num_angle_quantization
    }

    fn get_coords(index: usize, size_x: usize, num_angle_quantization: usize) -> Coordinates {
        Coordinates::new(
            ((index / num_angle_quantization) % size_x) as f64,
            (index / (num_angle_quantization * size_x)) as f64,
            (index % num_angle_quantization) as f64,
        )
    }

    fn get_neighbors<F: FnMut(usize) -> bool>(
        &self,
        motion_table: &MotionTable,
        size_x: usize,
        size_y: usize,
        mut is_valid: F,
        neighbors: &mut Vec<Neighbor<Coordinates>>,
    ) {
        let bins = motion_table.num_angle_quantization();
        let (sin, cos) = (self.pose.theta * motion_table.bin_size()).sin_cos();

        for primitive in motion_table.projections() {
            let x = self.pose.x + primitive.dx * cos - primitive.dy * sin;
            let y = self.pose.y + primitive.dx * sin + primitive.dy * cos;
            let (mx, my) = match cell_of(x, y, size_x, size_y) {
                Some(cell) => cell,
                None => continue,
            };
            let heading = (self.pose.theta + primitive.dtheta).rem_euclid(bins as f64);
            let theta = (heading.round() as usize) % bins;

            let index = Self::get_index(mx, my, theta, size_x, bins);
            if is_valid(index) {
                neighbors.push(Neighbor {
                    index,
                    coordinates: Coordinates::new(x, y, theta as f64),
                    travel_length: primitive.travel_length,
                });
            }
        }
    }
}

/// Cell whose centre is nearest to a continuous position, `None` off the map
fn cell_of(x: f64, y: f64, size_x: usize, size_y: usize) -> Option<(usize, usize)> {
    let fx = (x + 0.5 + CELL_EPSILON).floor();
    let fy = (y + 0.5 + CELL_EPSILON).floor();
    if fx < 0.0 || fy < 0.0 || fx >= size_x as f64 || fy >= size_y as f64 {
        return None;
    }
    Some((fx as usize, fy as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_planning::smac::motion_model::MotionModel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::SQRT_2;

    fn expand(node: &NodeSE2, table: &MotionTable, size: usize) -> Vec<Neighbor<Coordinates>> {
        let mut neighbors = Vec::new();
        node.get_neighbors(table, size, size, |_| true, &mut neighbors);
        neighbors
    }

    fn node_at(x: f64, y: f64, theta: f64) -> NodeSE2 {
        let mut node = NodeSE2::new(costs::FREE_SPACE, 0);
        node.set_coordinates(Coordinates::new(x, y, theta));
        node
    }

    #[test]
    fn test_index_round_trip_small_grid() {
        let (w, h, bins) = (7, 5, 12);
        let mut seen = vec![false; w * h * bins];
        for my in 0..h {
            for mx in 0..w {
                for theta in 0..bins {
                    let index = NodeSE2::get_index(mx, my, theta, w, bins);
                    assert!(!seen[index]);
                    seen[index] = true;
                    let c = NodeSE2::get_coords(index, w, bins);
                    assert_eq!(c, Coordinates::new(mx as f64, my as f64, theta as f64));
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_index_round_trip_random_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let w = rng.gen_range(1..500);
            let h = rng.gen_range(1..500);
            let bins = rng.gen_range(1..128);
            let (mx, my) = (rng.gen_range(0..w), rng.gen_range(0..h));
            let theta = rng.gen_range(0..bins);
            let index = NodeSE2::get_index(mx, my, theta, w, bins);
            assert!(index < w * h * bins);
            let c = NodeSE2::get_coords(index, w, bins);
            assert_eq!((c.x as usize, c.y as usize, c.theta as usize), (mx, my, theta));
        }
    }

    #[test]
    fn test_validity() {
        for (cost, unknown_ok, expected) in [
            (costs::FREE_SPACE, false, true),
            (costs::MAX_NON_OBSTACLE, false, true),
            (costs::INSCRIBED, true, false),
            (costs::OCCUPIED, true, false),
            (costs::UNKNOWN, true, true),
            (costs::UNKNOWN, false, false),
        ] {
            assert_eq!(NodeSE2::new(cost, 0).is_node_valid(unknown_ok), expected, "cost {}", cost);
        }
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut node = NodeSE2::new(10, 3);
        node.set_parent(1);
        node.set_accumulated_cost(4.0);
        node.visited();
        node.set_queued(true);
        node.set_coordinates(Coordinates::new(1.0, 2.0, 3.0));

        node.reset(20, 5);
        assert_eq!(node, NodeSE2::new(20, 5));
        assert_eq!(node.parent(), None);
        assert!(node.accumulated_cost().is_infinite());
        assert!(!node.was_visited());
        assert!(!node.is_queued());
    }

    #[test]
    fn test_traversal_cost() {
        assert!((NodeSE2::new(0, 0).traversal_cost(SQRT_2, 0.8) - SQRT_2).abs() < 1e-12);
        assert!((NodeSE2::new(252, 0).traversal_cost(2.0, 0.5) - 3.0).abs() < 1e-12);
        // Unknown cells cost the same as the highest non-lethal cost
        assert_eq!(
            NodeSE2::new(costs::UNKNOWN, 0).traversal_cost(1.0, 0.8),
            NodeSE2::new(costs::MAX_NON_OBSTACLE, 0).traversal_cost(1.0, 0.8)
        );
    }

    #[test]
    fn test_heuristic_ignores_heading() {
        let a = Coordinates::new(0.0, 0.0, 0.0);
        let goal = Coordinates::new(3.0, 4.0, 0.0);
        assert_eq!(NodeSE2::heuristic_cost(&a, &goal), 5.0);
        let turned = Coordinates::new(0.0, 0.0, 36.0);
        assert_eq!(NodeSE2::heuristic_cost(&turned, &goal), 5.0);
    }

    #[test]
    fn test_neighbors_rotate_with_heading() {
        let table = MotionTable::new(MotionModel::BalkcomMason, 8, 1.0).unwrap();
        // Facing +y (bin 2 of 8)
        let node = node_at(5.0, 5.0, 2.0);
        let neighbors = expand(&node, &table, 10);
        assert_eq!(neighbors.len(), 8);

        let forward = neighbors[0];
        assert!((forward.coordinates.x - 5.0).abs() < 1e-9);
        assert!((forward.coordinates.y - (5.0 + SQRT_2)).abs() < 1e-9);
        assert_eq!(forward.coordinates.theta, 2.0);
        assert_eq!(forward.index, NodeSE2::get_index(5, 6, 2, 10, 8));
    }

    #[test]
    fn test_heading_wraps() {
        let table = MotionTable::new(MotionModel::BalkcomMason, 8, 1.0).unwrap();
        let neighbors = expand(&node_at(5.0, 5.0, 0.0), &table, 10);
        let spins: Vec<f64> = neighbors
            .iter()
            .filter(|n| n.travel_length < 1.0)
            .map(|n| n.coordinates.theta)
            .collect();
        assert_eq!(spins.len(), 2);
        assert!(spins.contains(&1.0));
        assert!(spins.contains(&7.0));
        assert!(neighbors.iter().all(|n| n.coordinates.theta < 8.0));
    }

    #[test]
    fn test_off_map_successors_are_dropped() {
        let table = MotionTable::new(MotionModel::Dubin, 72, 4.0).unwrap();
        // At the right edge facing +x: forward and both arcs leave the map
        let neighbors = expand(&node_at(9.5, 5.0, 0.0), &table, 10);
        assert!(neighbors.is_empty());

        // Facing -x from the left edge never wraps to the far side
        let neighbors = expand(&node_at(0.2, 5.0, 36.0), &table, 10);
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_validity_callback_filters() {
        let table = MotionTable::new(MotionModel::ReedsShepp, 16, 2.0).unwrap();
        let node = node_at(5.0, 5.0, 0.0);
        let mut neighbors = Vec::new();
        node.get_neighbors(&table, 10, 10, |_| false, &mut neighbors);
        assert!(neighbors.is_empty());

        let mut calls = 0;
        node.get_neighbors(
            &table,
            10,
            10,
            |_| {
                calls += 1;
                true
            },
            &mut neighbors,
        );
        assert_eq!(calls, 6);
        assert_eq!(neighbors.len(), 6);
    }

    #[test]
    fn test_cell_of_nearest_centre() {
        assert_eq!(cell_of(2.83, 1.0, 5, 5), Some((3, 1)));
        assert_eq!(cell_of(2.4999999, 1.0, 5, 5), Some((3, 1)));
        assert_eq!(cell_of(2.49, 1.2, 5, 5), Some((2, 1)));
        assert_eq!(cell_of(-0.49, 0.0, 5, 5), Some((0, 0)));
        assert_eq!(cell_of(-0.6, 1.0, 5, 5), None);
        assert_eq!(cell_of(4.49, 4.49, 5, 5), Some((4, 4)));
        assert_eq!(cell_of(4.5, 0.0, 5, 5), None);
    }

    #[test]
    fn test_successor_cell_matches_world_cell() {
        let table = MotionTable::new(MotionModel::BalkcomMason, 8, 1.0).unwrap();
        let costmap =
            crate::mapping::Costmap2D::new(10, 10, 1.0, 0.0, 0.0, costs::FREE_SPACE).unwrap();
        // Two straight moves from the centre of cell (0, 5)
        let first = expand(&node_at(0.0, 5.0, 0.0), &table, 10)[0];
        let second = expand(&node_at(first.coordinates.x, 5.0, 0.0), &table, 10)[0];
        assert!((second.coordinates.x - 2.0 * SQRT_2).abs() < 1e-9);

        let (wx, wy) = costmap.map_to_world(second.coordinates.x, second.coordinates.y);
        let (mx, my) = costmap.world_to_map(wx, wy).unwrap();
        assert_eq!(second.index, NodeSE2::get_index(mx, my, 0, 10, 8));
        assert_eq!((mx, my), (3, 5));
    }
}
