//! A* search over a lattice of search nodes
//!
//! The engine is generic over [`SearchNode`]: it owns an arena of nodes, one
//! per discretized state, and links them through parent indices. It knows
//! nothing about vehicle kinematics beyond what the node trait exposes.
//!
//! Budgets: a maximum number of expansions, a maximum number of expansions
//! once the goal tolerance radius has first been entered, and an optional
//! wall-clock limit sampled every [`TIME_CHECK_INTERVAL`] expansions. When the
//! budget runs out after a node within tolerance was seen, the best such node
//! is returned instead of failing.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use ordered_float::NotNan;

use crate::common::{PlannerError, PlannerResult};

use super::motion_model::MotionTable;

/// Expansions between two reads of the clock
pub const TIME_CHECK_INTERVAL: usize = 1000;

/// A candidate successor produced by neighbor expansion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<C> {
    /// Graph index of the successor state
    pub index: usize,
    /// Continuous coordinates reached by the motion
    pub coordinates: C,
    /// Distance travelled by the motion [cells]
    pub travel_length: f64,
}

/// Capabilities a lattice vertex needs to take part in the search
pub trait SearchNode: Sized {
    type Coordinates: Copy + Debug;

    /// Fresh, unvisited node
    fn new(cell_cost: u8, index: usize) -> Self;
    /// Restore the freshly allocated state for graph reuse
    fn reset(&mut self, cell_cost: u8, index: usize);

    fn index(&self) -> usize;
    fn cell_cost(&self) -> u8;
    fn accumulated_cost(&self) -> f64;
    fn set_accumulated_cost(&mut self, cost: f64);
    fn parent(&self) -> Option<usize>;
    fn set_parent(&mut self, parent: usize);
    fn was_visited(&self) -> bool;
    fn visited(&mut self);
    fn is_queued(&self) -> bool;
    fn set_queued(&mut self, queued: bool);
    fn coordinates(&self) -> Self::Coordinates;
    fn set_coordinates(&mut self, coordinates: Self::Coordinates);

    /// Whether the node's cell may be entered
    fn is_node_valid(&self, traverse_unknown: bool) -> bool;
    /// Cost of arriving at this node with a motion of `travel_length`
    fn traversal_cost(&self, travel_length: f64, travel_cost_scale: f64) -> f64;
    /// Estimated cost between two states
    fn heuristic_cost(node: &Self::Coordinates, goal: &Self::Coordinates) -> f64;

    fn get_index(
        mx: usize,
        my: usize,
        theta: usize,
        size_x: usize,
        num_angle_quantization: usize,
    ) -> usize;
    fn get_coords(index: usize, size_x: usize, num_angle_quantization: usize)
        -> Self::Coordinates;

    /// Push every successor accepted by `is_valid` onto `neighbors`.
    ///
    /// `is_valid` receives a graph index and is responsible for the bounds,
    /// occupancy and closed-set checks.
    fn get_neighbors<F: FnMut(usize) -> bool>(
        &self,
        motion_table: &MotionTable,
        size_x: usize,
        size_y: usize,
        is_valid: F,
        neighbors: &mut Vec<Neighbor<Self::Coordinates>>,
    );
}

/// Search limits and cost weighting
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Weight of cell cost against distance, in [0, 1]
    pub travel_cost_scale: f64,
    pub allow_unknown: bool,
    pub max_iterations: usize,
    pub max_on_approach_iterations: usize,
    pub max_planning_time: Option<Duration>,
}

impl SearchParams {
    /// Build from configuration values where `<= 0` disables a limit
    pub fn new(
        travel_cost_scale: f64,
        allow_unknown: bool,
        max_iterations: i64,
        max_on_approach_iterations: i64,
        max_planning_time: f64,
    ) -> Self {
        Self {
            travel_cost_scale,
            allow_unknown,
            max_iterations: iteration_limit(max_iterations),
            max_on_approach_iterations: iteration_limit(max_on_approach_iterations),
            max_planning_time: if max_planning_time > 0.0 && max_planning_time.is_finite() {
                Some(Duration::from_secs_f64(max_planning_time))
            } else {
                None
            },
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new(0.8, true, -1, -1, -1.0)
    }
}

/// Map a configured iteration count to a limit, `<= 0` meaning unbounded
pub fn iteration_limit(value: i64) -> usize {
    if value <= 0 {
        usize::MAX
    } else {
        value as usize
    }
}

/// Result of one search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<C> {
    /// Path in goal-to-start order
    Found { path: Vec<C>, iterations: usize },
    /// The open set was exhausted
    NoPathFound { iterations: usize },
    /// The iteration budget ran out first
    IterationsExceeded { iterations: usize },
    /// The time budget ran out first
    TimedOut { iterations: usize },
}

impl<C> SearchOutcome<C> {
    pub fn iterations(&self) -> usize {
        match self {
            SearchOutcome::Found { iterations, .. }
            | SearchOutcome::NoPathFound { iterations }
            | SearchOutcome::IterationsExceeded { iterations }
            | SearchOutcome::TimedOut { iterations } => *iterations,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }
}

type QueueEntry = Reverse<(NotNan<f64>, NotNan<f64>, usize)>;

/// A* over an arena of search nodes
#[derive(Debug)]
pub struct AStarAlgorithm<N: SearchNode> {
    motion_table: Arc<MotionTable>,
    params: SearchParams,
    graph: Vec<N>,
    size_x: usize,
    size_y: usize,
    num_angle_quantization: usize,
    start: Option<(usize, N::Coordinates)>,
    goal: Option<(usize, N::Coordinates)>,
    dirty: bool,
}

impl<N: SearchNode> AStarAlgorithm<N> {
    pub fn new(motion_table: Arc<MotionTable>, params: SearchParams) -> PlannerResult<Self> {
        if !(0.0..=1.0).contains(&params.travel_cost_scale) {
            return Err(PlannerError::Configuration(format!(
                "travel cost scale must be between 0 and 1, got {}",
                params.travel_cost_scale
            )));
        }
        if motion_table.is_empty() {
            return Err(PlannerError::Configuration(
                "motion model has no primitives".to_string(),
            ));
        }

        Ok(Self {
            motion_table,
            params,
            graph: Vec::new(),
            size_x: 0,
            size_y: 0,
            num_angle_quantization: 0,
            start: None,
            goal: None,
            dirty: false,
        })
    }

    /// Allocate or reset one node per (cell, heading bin).
    ///
    /// The node pool is reused without reallocation when its size is unchanged.
    pub fn create_graph(
        &mut self,
        size_x: usize,
        size_y: usize,
        num_angle_quantization: usize,
        costs: &[u8],
    ) -> PlannerResult<()> {
        if costs.len() != size_x * size_y {
            return Err(PlannerError::InvalidUse(format!(
                "cost buffer holds {} cells, graph needs {}",
                costs.len(),
                size_x * size_y
            )));
        }
        if num_angle_quantization != self.motion_table.num_angle_quantization() {
            return Err(PlannerError::InvalidUse(format!(
                "graph uses {} heading bins but the motion model was built for {}",
                num_angle_quantization,
                self.motion_table.num_angle_quantization()
            )));
        }

        let total = size_x * size_y * num_angle_quantization;
        if self.graph.len() == total {
            for (index, node) in self.graph.iter_mut().enumerate() {
                node.reset(costs[index / num_angle_quantization], index);
            }
        } else {
            self.graph = (0..total)
                .map(|index| N::new(costs[index / num_angle_quantization], index))
                .collect();
        }

        self.size_x = size_x;
        self.size_y = size_y;
        self.num_angle_quantization = num_angle_quantization;
        self.start = None;
        self.goal = None;
        self.dirty = false;
        Ok(())
    }

    pub fn set_start(&mut self, mx: usize, my: usize, theta: usize) -> PlannerResult<()> {
        self.start = Some(self.endpoint("start", mx, my, theta)?);
        Ok(())
    }

    pub fn set_goal(&mut self, mx: usize, my: usize, theta: usize) -> PlannerResult<()> {
        self.goal = Some(self.endpoint("goal", mx, my, theta)?);
        Ok(())
    }

    fn endpoint(
        &self,
        name: &str,
        mx: usize,
        my: usize,
        theta: usize,
    ) -> PlannerResult<(usize, N::Coordinates)> {
        if self.graph.is_empty() {
            return Err(PlannerError::InvalidUse(format!(
                "{} set before the graph was created",
                name
            )));
        }
        if mx >= self.size_x || my >= self.size_y || theta >= self.num_angle_quantization {
            return Err(PlannerError::InvalidUse(format!(
                "{} ({}, {}, {}) is outside the {}x{}x{} graph",
                name, mx, my, theta, self.size_x, self.size_y, self.num_angle_quantization
            )));
        }
        let index = N::get_index(mx, my, theta, self.size_x, self.num_angle_quantization);
        Ok((index, N::get_coords(index, self.size_x, self.num_angle_quantization)))
    }

    pub fn max_iterations(&self) -> usize {
        self.params.max_iterations
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn graph_size(&self) -> usize {
        self.graph.len()
    }

    /// Run the search.
    ///
    /// `tolerance` is a goal radius in cells; 0 disables early acceptance.
    pub fn create_path(
        &mut self,
        tolerance: f64,
    ) -> PlannerResult<SearchOutcome<N::Coordinates>> {
        let (start, start_coordinates) = self
            .start
            .ok_or_else(|| PlannerError::InvalidUse("starting point was not set".to_string()))?;
        let (goal, goal_coordinates) = self
            .goal
            .ok_or_else(|| PlannerError::InvalidUse("goal was not set".to_string()))?;

        if self.dirty {
            for node in self.graph.iter_mut() {
                let (cost, index) = (node.cell_cost(), node.index());
                node.reset(cost, index);
            }
        }
        self.dirty = true;

        let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
        {
            let node = &mut self.graph[start];
            node.set_coordinates(start_coordinates);
            node.set_accumulated_cost(0.0);
            node.set_queued(true);
        }
        let h = N::heuristic_cost(&start_coordinates, &goal_coordinates);
        queue.push(Reverse((not_nan(h)?, not_nan(h)?, start)));

        let started = Instant::now();
        let mut iterations = 0usize;
        let mut approach_iterations = 0usize;
        let mut best_in_tolerance: Option<(f64, usize)> = None;
        let mut neighbors = Vec::with_capacity(self.motion_table.len());
        let mut exhausted = false;
        let mut timed_out = false;

        while iterations < self.params.max_iterations {
            if iterations > 0 && iterations % TIME_CHECK_INTERVAL == 0 {
                if let Some(limit) = self.params.max_planning_time {
                    if started.elapsed() > limit {
                        timed_out = true;
                        break;
                    }
                }
            }

            let current = match queue.pop() {
                Some(Reverse((_, _, index))) => index,
                None => {
                    exhausted = true;
                    break;
                }
            };

            // Stale entry for a node already expanded through a cheaper parent
            if self.graph[current].was_visited() {
                continue;
            }
            iterations += 1;
            self.graph[current].visited();
            self.graph[current].set_queued(false);

            if current == goal {
                debug!("Reached goal after {} iterations", iterations);
                return Ok(SearchOutcome::Found {
                    path: self.backtrace(current, goal, goal_coordinates),
                    iterations,
                });
            }

            if tolerance > 0.0 {
                let coordinates = self.graph[current].coordinates();
                let distance = N::heuristic_cost(&coordinates, &goal_coordinates);
                if distance <= tolerance
                    && best_in_tolerance.map_or(true, |(best, _)| distance < best)
                {
                    best_in_tolerance = Some((distance, current));
                }
                // Every expansion after the radius was first entered counts
                if best_in_tolerance.is_some() {
                    approach_iterations += 1;
                    if approach_iterations >= self.params.max_on_approach_iterations {
                        break;
                    }
                }
            }

            neighbors.clear();
            let graph = &self.graph;
            let traverse_unknown = self.params.allow_unknown;
            graph[current].get_neighbors(
                &self.motion_table,
                self.size_x,
                self.size_y,
                |index| {
                    index < graph.len()
                        && !graph[index].was_visited()
                        && graph[index].is_node_valid(traverse_unknown)
                },
                &mut neighbors,
            );

            let current_cost = self.graph[current].accumulated_cost();
            for neighbor in &neighbors {
                let child = &mut self.graph[neighbor.index];
                let g = current_cost
                    + child.traversal_cost(neighbor.travel_length, self.params.travel_cost_scale);
                if g < child.accumulated_cost() {
                    child.set_accumulated_cost(g);
                    child.set_parent(current);
                    child.set_coordinates(neighbor.coordinates);
                    child.set_queued(true);
                    let h = N::heuristic_cost(&neighbor.coordinates, &goal_coordinates);
                    queue.push(Reverse((not_nan(g + h)?, not_nan(h)?, neighbor.index)));
                }
            }
        }

        if let Some((distance, best)) = best_in_tolerance {
            debug!(
                "Accepting node {:.3} cells from goal after {} iterations",
                distance, iterations
            );
            return Ok(SearchOutcome::Found {
                path: self.backtrace(best, goal, goal_coordinates),
                iterations,
            });
        }

        Ok(if exhausted {
            SearchOutcome::NoPathFound { iterations }
        } else if timed_out {
            SearchOutcome::TimedOut { iterations }
        } else {
            SearchOutcome::IterationsExceeded { iterations }
        })
    }

    /// Follow parent links from `index` back to the start (goal-to-start order)
    fn backtrace(
        &self,
        index: usize,
        goal: usize,
        goal_coordinates: N::Coordinates,
    ) -> Vec<N::Coordinates> {
        let mut path = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &self.graph[i];
            path.push(if i == goal { goal_coordinates } else { node.coordinates() });
            current = node.parent();
        }
        path
    }
}

fn not_nan(value: f64) -> PlannerResult<NotNan<f64>> {
    NotNan::new(value)
        .map_err(|_| PlannerError::InvalidUse("search produced a NaN cost".to_string()))
}
