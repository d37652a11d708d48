/*
 * Copyright (C) 2023 Open Source Robotics Foundation
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
*/

use crate::{
    error::InvalidArgument,
    graph::EdgeId,
    path::Path,
    problem::Problem,
    roadmap::{NodeId, Roadmap},
    statistics::{self, EdgeStatistics, Reason},
    steering::{PathProjector, Projected, SteeringMethod},
    validation::{GraphPathValidator, Validity},
    Configuration,
};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, trace};

/// How many neighbors per foreign component the roadmap-connection fallback
/// considers for each new node.
const K_NEAREST: usize = 7;

/// A randomized roadmap planner over a constraint graph. Each step samples
/// one configuration and tries to extend every connected component toward it
/// along a randomly drawn outgoing mode transition, then joins whatever new
/// nodes appeared back to the rest of the roadmap.
pub struct ManipulationPlanner {
    problem: Arc<Problem>,
    roadmap: Roadmap,
    extend_step: f64,
    rng: StdRng,
    stats: EdgeStatistics,
}

impl std::fmt::Debug for ManipulationPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManipulationPlanner").finish_non_exhaustive()
    }
}

impl ManipulationPlanner {
    /// Bind a planner to a problem and a roadmap. Fails when the roadmap is
    /// not built on the problem's constraint graph, or when the problem's
    /// path validation watches some other graph.
    pub fn create(problem: Arc<Problem>, roadmap: Roadmap) -> Result<Self, InvalidArgument> {
        if !Arc::ptr_eq(roadmap.constraint_graph(), problem.constraint_graph()) {
            return Err(InvalidArgument::Roadmap);
        }
        if !Arc::ptr_eq(problem.path_validation().graph(), problem.constraint_graph()) {
            return Err(InvalidArgument::Problem);
        }
        Ok(Self {
            problem,
            roadmap,
            extend_step: 1.0,
            rng: StdRng::from_entropy(),
            stats: EdgeStatistics::new(),
        })
    }

    /// Make the planner's draws reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn problem(&self) -> &Arc<Problem> {
        &self.problem
    }

    pub fn roadmap(&self) -> &Roadmap {
        &self.roadmap
    }

    pub fn extend_step(&self) -> f64 {
        self.extend_step
    }

    /// Fraction of each valid extension that is actually inserted, in
    /// `(0, 1]`. Values below one extend cautiously.
    pub fn set_extend_step(&mut self, step: f64) {
        assert!(step > 0.0 && step <= 1.0);
        self.extend_step = step;
    }

    pub fn statistics(&self) -> &EdgeStatistics {
        &self.stats
    }

    /// Success and reported-failure counters of `edge`; all zero when the
    /// edge was never drawn.
    pub fn get_edge_stat(&self, edge: EdgeId) -> Vec<usize> {
        self.stats.get_edge_stat(edge)
    }

    /// The display strings matching [`Self::get_edge_stat`].
    pub fn error_list() -> Vec<String> {
        statistics::error_list()
    }

    /// Advance the planner by one iteration.
    pub fn one_step(&mut self) {
        let shooter = self.problem.configuration_shooter().clone();
        let q_rand = shooter.shoot(&mut self.rng);
        let graph = self.problem.constraint_graph().clone();

        // Extensions see the roadmap as it was when the step began; nodes
        // admitted by earlier (component, state) pairs are not candidates
        // for later ones.
        let components = self.roadmap.connected_components();
        let states: Vec<_> = graph.states().collect();
        let horizon = self.roadmap.node_count();

        let mut new_nodes: Vec<NodeId> = Vec::new();
        let mut delayed_edges: Vec<(NodeId, Configuration, Path)> = Vec::new();

        for &component in &components {
            for &state in &states {
                let Some((near, _)) =
                    self.roadmap
                        .nearest_node_before(&q_rand, component, state, horizon)
                else {
                    continue;
                };
                let Some(valid_path) = self.extend(near, &q_rand) else {
                    continue;
                };
                let (t_min, t_max) = valid_path.time_range();
                if t_max == t_min {
                    continue;
                }
                let Some(q_new) = valid_path.eval(t_max) else {
                    continue;
                };
                let duplicate = new_nodes
                    .iter()
                    .any(|&n| *self.roadmap.node(n).configuration() == q_new);
                if duplicate {
                    // Another component already produced this configuration
                    // in this step; defer the insertion so it still
                    // materializes once direct inserts are done.
                    delayed_edges.push((near, q_new, valid_path));
                } else {
                    match self.roadmap.add_node_and_edges(near, q_new, valid_path) {
                        Ok(node) => new_nodes.push(node),
                        Err(err) => {
                            debug!(%err, "discarding an extension that cannot enter the roadmap")
                        }
                    }
                }
            }
        }

        for (near, q_new, path) in delayed_edges {
            let node = match self.roadmap.add_node(q_new) {
                Ok(node) => node,
                Err(err) => {
                    debug!(%err, "discarding a delayed edge whose endpoint has no state");
                    continue;
                }
            };
            let (t_min, t_max) = path.time_range();
            match path.extract((t_max, t_min)) {
                Ok(reverse) => {
                    self.roadmap.add_edge(near, node, path);
                    self.roadmap.add_edge(node, near, reverse);
                }
                Err(err) => debug!(%err, "discarding a delayed edge that cannot be reversed"),
            }
        }

        let connections = self.try_connect_new_nodes(&new_nodes);
        if connections == 0 {
            self.try_connect_to_roadmap(&new_nodes);
        }
        trace!(
            new_nodes = new_nodes.len(),
            connections,
            nodes = self.roadmap.node_count(),
            "planner step finished"
        );
    }

    /// Try to grow the roadmap from `near` toward `q_rand` along one drawn
    /// transition. Returns the path that should be inserted, or None when
    /// the attempt failed; either way the outcome lands in the edge's
    /// statistics.
    pub(crate) fn extend(&mut self, near: NodeId, q_rand: &Configuration) -> Option<Path> {
        let graph = self.problem.constraint_graph().clone();
        let near_state = self.roadmap.node(near).state();
        let q_near = self.roadmap.node(near).configuration().clone();

        let edge_id = graph.choose_edge(near_state, &mut self.rng)?;
        let edge = graph.edge(edge_id);

        let mut q_proj = q_rand.clone();
        if !edge.apply_constraints(&q_near, &mut q_proj) {
            self.stats
                .slot_mut(edge_id, edge.name())
                .add_failure(Reason::Projection);
            return None;
        }

        let Some(path) = edge.build(&q_near, &q_proj) else {
            self.stats
                .slot_mut(edge_id, edge.name())
                .add_failure(Reason::SteeringMethod);
            return None;
        };

        let projector = edge
            .projector()
            .cloned()
            .or_else(|| self.problem.path_projector().cloned());
        let (projected, projection_shortened) = match &projector {
            None => (path, false),
            Some(projector) => match projector.apply(&path) {
                Projected::Complete(p) => (p, false),
                Projected::Truncated(p) => {
                    if p.length() == 0.0 {
                        self.stats
                            .slot_mut(edge_id, edge.name())
                            .add_failure(Reason::PathProjectionZero);
                        return None;
                    }
                    (p, true)
                }
                Projected::Infeasible => {
                    self.stats
                        .slot_mut(edge_id, edge.name())
                        .add_failure(Reason::PathProjectionZero);
                    return None;
                }
            },
        };

        let validity = match self.problem.path_validation().validate(&projected, false) {
            Ok(validity) => validity,
            Err(err) => {
                debug!(%err, edge = edge.name(), "validation could not project the path");
                self.stats
                    .slot_mut(edge_id, edge.name())
                    .add_failure(Reason::PathValidationZero);
                return None;
            }
        };
        let (full_valid, fully_valid) = match validity {
            Validity::Valid => (projected, true),
            Validity::Invalid(part) => (part, false),
        };
        if full_valid.length() == 0.0 {
            self.stats
                .slot_mut(edge_id, edge.name())
                .add_failure(Reason::PathValidationZero);
            return None;
        }

        let whole = self.extend_step >= 1.0;
        let delivered = if whole {
            full_valid
        } else {
            let (t_init, _) = full_valid.time_range();
            let target = t_init + full_valid.length() * self.extend_step;
            match full_valid.extract((t_init, target)) {
                Ok(part) => part,
                Err(err) => {
                    debug!(%err, edge = edge.name(), "cautious extension failed to extract");
                    self.stats
                        .slot_mut(edge_id, edge.name())
                        .add_failure(Reason::PathProjectionShorter);
                    return None;
                }
            }
        };

        let stat = self.stats.slot_mut(edge_id, edge.name());
        if projection_shortened {
            stat.add_failure(Reason::PathProjectionShorter);
        } else if !fully_valid {
            stat.add_failure(Reason::PathValidationShorter);
        } else {
            stat.add_success();
        }
        if projection_shortened || !fully_valid || !whole {
            stat.add_failure(Reason::PartlyExtended);
        }
        trace!(
            edge = edge.name(),
            length = delivered.length(),
            "extension produced a path"
        );
        Some(delivered)
    }

    /// Steer, project, and validate a connection between two
    /// configurations; only fully valid paths qualify.
    fn attempt_connection(
        &self,
        steering: &Arc<dyn SteeringMethod>,
        validation: &Arc<GraphPathValidator>,
        projector: Option<&Arc<dyn PathProjector>>,
        q1: &Configuration,
        q2: &Configuration,
    ) -> Option<Path> {
        let path = steering.steer(q1, q2)?;
        let projected = match projector {
            Some(projector) => match projector.apply(&path) {
                Projected::Complete(p) => p,
                Projected::Truncated(_) | Projected::Infeasible => return None,
            },
            None => path,
        };
        match validation.validate(&projected, false) {
            Ok(Validity::Valid) => Some(projected),
            _ => None,
        }
    }

    /// Install whichever of the two directions is missing.
    fn install_connection(
        &mut self,
        n1: NodeId,
        n2: NodeId,
        has_forward: bool,
        has_backward: bool,
        path: Path,
    ) {
        if !has_forward {
            self.roadmap.add_edge(n1, n2, path.clone());
        }
        if !has_backward {
            let (t_min, t_max) = path.time_range();
            match path.extract((t_max, t_min)) {
                Ok(reverse) => {
                    self.roadmap.add_edge(n2, n1, reverse);
                }
                Err(err) => debug!(%err, "connection path could not be reversed"),
            }
        }
    }

    /// Try to join this step's new nodes to each other, pairwise across
    /// distinct components.
    fn try_connect_new_nodes(&mut self, nodes: &[NodeId]) -> usize {
        let steering = self.problem.steering_method().clone();
        let validation = self.problem.path_validation().clone();
        let projector = self.problem.path_projector().cloned();
        let mut connections = 0;
        for (i, &n1) in nodes.iter().enumerate() {
            let q1 = self.roadmap.node(n1).configuration().clone();
            for &n2 in &nodes[i + 1..] {
                if self.roadmap.component_of(n1) == self.roadmap.component_of(n2) {
                    continue;
                }
                let has_forward = self.roadmap.is_out_neighbor(n1, n2);
                let has_backward = self.roadmap.is_in_neighbor(n1, n2);
                if has_forward && has_backward {
                    debug!("the two nodes are already connected");
                    continue;
                }
                let q2 = self.roadmap.node(n2).configuration().clone();
                if q1 == q2 {
                    continue;
                }
                if let Some(path) =
                    self.attempt_connection(&steering, &validation, projector.as_ref(), &q1, &q2)
                {
                    connections += 1;
                    self.install_connection(n1, n2, has_forward, has_backward, path);
                }
            }
        }
        connections
    }

    /// Fallback when the new nodes could not be joined to each other: link
    /// each of them to the nearest nodes of every other component, stopping
    /// at the first component reached.
    fn try_connect_to_roadmap(&mut self, nodes: &[NodeId]) -> usize {
        let steering = self.problem.steering_method().clone();
        let validation = self.problem.path_validation().clone();
        let projector = self.problem.path_projector().cloned();
        let mut connections = 0;
        for &n1 in nodes {
            let q1 = self.roadmap.node(n1).configuration().clone();
            let mut connected = false;
            for component in self.roadmap.connected_components() {
                if component == self.roadmap.component_of(n1) {
                    continue;
                }
                for n2 in self.roadmap.k_nearest(&q1, component, K_NEAREST) {
                    let has_forward = self.roadmap.is_out_neighbor(n1, n2);
                    let has_backward = self.roadmap.is_in_neighbor(n1, n2);
                    if has_forward && has_backward {
                        debug!("the two nodes are already connected");
                        continue;
                    }
                    let q2 = self.roadmap.node(n2).configuration().clone();
                    if q1 == q2 {
                        continue;
                    }
                    if let Some(path) = self.attempt_connection(
                        &steering,
                        &validation,
                        projector.as_ref(),
                        &q1,
                        &q2,
                    ) {
                        connections += 1;
                        self.install_connection(n1, n2, has_forward, has_backward, path);
                        connected = true;
                        break;
                    }
                }
                if connected {
                    break;
                }
            }
        }
        connections
    }
}
