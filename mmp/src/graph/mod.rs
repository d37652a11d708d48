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

//! The discrete transition system that manipulation planning explores:
//! states are constraint conjunctions characterizing a configuration's mode,
//! edges are feasible mode transitions carrying their own steering method,
//! projector, and path constraints.

pub mod edge;
pub use edge::{Edge, EdgeId, TransitionKind};

pub mod state;
pub use state::{State, StateId};

use crate::{
    constraint::ConstraintSet,
    error::StateLookupError,
    steering::SteeringMethod,
    Configuration,
};
use rand::{Rng, RngCore};
use smallvec::SmallVec;
use std::sync::Arc;

/// An ordered set of states containing some configuration. Insertion order
/// of the graph doubles as priority order.
pub type StateSet = SmallVec<[StateId; 4]>;

/// A chain of edges realizing a mode change. Current construction only
/// produces single-edge chains, but consumers must not rely on that.
pub type EdgeSequence = SmallVec<[EdgeId; 2]>;

/// Arena of manipulation modes and transitions. States and edges are owned
/// here and addressed by stable integer handles; the graph is immutable once
/// planning starts.
pub struct ConstraintGraph {
    name: String,
    states: Vec<State>,
    edges: Vec<Edge>,
}

impl ConstraintGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a state. States inserted earlier take precedence in
    /// configuration lookup, so insert the more specific modes first.
    pub fn add_state(&mut self, name: impl Into<String>, constraint: ConstraintSet) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State::new(name.into(), constraint));
        id
    }

    /// Register a transition with sampling weight 1 and an empty leaf. The
    /// destination state's constraints are captured as the transition's
    /// projection target at this point, so wire states before edges.
    pub fn add_edge(
        &mut self,
        name: impl Into<String>,
        kind: TransitionKind,
        from: StateId,
        to: StateId,
        steering: Arc<dyn SteeringMethod>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            id,
            name: name.into(),
            from,
            to,
            kind,
            weight: 1,
            leaf: ConstraintSet::empty("leaf"),
            target: self.states[to.0].constraint.clone(),
            steering,
            projector: None,
        });
        self.states[from.0].out_edges.push(id);
        id
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0]
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// All state handles, in insertion order.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.states.len()).map(StateId)
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId)
    }

    /// Every state containing `q`, in insertion order. Fails when no state
    /// contains `q`, which callers interpret as "configuration
    /// unprojectable".
    pub fn states_of(&self, q: &Configuration) -> Result<StateSet, StateLookupError> {
        let found: StateSet = self
            .states()
            .filter(|id| self.states[id.0].contains(q))
            .collect();
        if found.is_empty() {
            return Err(StateLookupError);
        }
        Ok(found)
    }

    /// The node-selector policy: the first containing state wins.
    pub fn first_state_of(&self, q: &Configuration) -> Result<StateId, StateLookupError> {
        self.states()
            .find(|id| self.states[id.0].contains(q))
            .ok_or(StateLookupError)
    }

    /// Every transition chain able to carry a path from any state in `orig`
    /// to any state in `dest`, in construction order. Consumers examine the
    /// result from the back.
    pub fn edges_between(&self, orig: &[StateId], dest: &[StateId]) -> Vec<EdgeSequence> {
        let mut sequences = Vec::new();
        for &o in orig {
            for &d in dest {
                for &e in self.states[o.0].out_edges() {
                    if self.edges[e.0].to == d {
                        sequences.push(EdgeSequence::from_slice(&[e]));
                    }
                }
            }
        }
        sequences
    }

    /// Draw one outgoing transition of `from`, weighted by edge weight.
    /// Returns None when the state has no enabled outgoing edge. Repeated
    /// calls exercise every enabled edge with positive probability.
    pub fn choose_edge(&self, from: StateId, rng: &mut dyn RngCore) -> Option<EdgeId> {
        let out = self.states[from.0].out_edges();
        let total: usize = out.iter().map(|e| self.edges[e.0].weight).sum();
        if total == 0 {
            return None;
        }
        let mut draw = rng.gen_range(0..total);
        for &e in out {
            let weight = self.edges[e.0].weight;
            if draw < weight {
                return Some(e);
            }
            draw -= weight;
        }
        None
    }

    /// The aggregated leaf constraints along a transition chain.
    pub fn path_constraint(&self, sequence: &[EdgeId]) -> ConstraintSet {
        let name = sequence
            .iter()
            .map(|e| self.edges[e.0].name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let mut aggregate = ConstraintSet::empty(name);
        for &e in sequence {
            aggregate.merge(&self.edges[e.0].leaf);
        }
        aggregate
    }
}

impl std::fmt::Debug for ConstraintGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintGraph")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{LockedJoints, RelativeLock};
    use crate::steering::LinearSteering;
    use nalgebra::dvector;
    use rand::{rngs::StdRng, SeedableRng};

    /// Gripper on coordinate 0, object on coordinate 1. The grasp state is
    /// inserted first so that grasped configurations resolve to it.
    fn gripper_and_ball() -> (ConstraintGraph, StateId, StateId) {
        let steering: Arc<dyn SteeringMethod> = Arc::new(LinearSteering::default());
        let mut graph = ConstraintGraph::new("gripper-and-ball");
        let grasp = graph.add_state(
            "grasp",
            ConstraintSet::empty("grasped")
                .with(Arc::new(RelativeLock::coincident("hold", vec![(1, 0)]))),
        );
        let free = graph.add_state(
            "free",
            ConstraintSet::empty("placed")
                .with(Arc::new(LockedJoints::new("placement", vec![1], vec![0.0]))),
        );
        let transit = graph.add_edge(
            "transit",
            TransitionKind::FreeMotion,
            free,
            free,
            steering.clone(),
        );
        graph.edge_mut(transit).set_leaf(
            ConstraintSet::empty("keep placement")
                .with(Arc::new(LockedJoints::new("still", vec![1], vec![0.0]))),
        );
        let approach = graph.add_edge(
            "approach",
            TransitionKind::Grasp,
            free,
            grasp,
            steering.clone(),
        );
        graph.edge_mut(approach).set_leaf(
            ConstraintSet::empty("keep placement")
                .with(Arc::new(LockedJoints::new("still", vec![1], vec![0.0]))),
        );
        let release = graph.add_edge(
            "release",
            TransitionKind::Release,
            grasp,
            free,
            steering.clone(),
        );
        graph.edge_mut(release).set_leaf(
            ConstraintSet::empty("keep grasp")
                .with(Arc::new(RelativeLock::coincident("hold", vec![(1, 0)]))),
        );
        let transfer = graph.add_edge(
            "transfer",
            TransitionKind::FreeMotion,
            grasp,
            grasp,
            steering,
        );
        graph.edge_mut(transfer).set_leaf(
            ConstraintSet::empty("keep grasp")
                .with(Arc::new(RelativeLock::coincident("hold", vec![(1, 0)]))),
        );
        (graph, free, grasp)
    }

    #[test]
    fn lookup_reports_states_in_insertion_order() {
        let (graph, free, grasp) = gripper_and_ball();
        // Gripper at the placement: both modes hold, grasp first.
        let both = graph.states_of(&dvector![0.0, 0.0]).unwrap();
        assert_eq!(both.as_slice(), &[grasp, free]);
        assert_eq!(graph.first_state_of(&dvector![0.0, 0.0]).unwrap(), grasp);

        let only_free = graph.states_of(&dvector![0.7, 0.0]).unwrap();
        assert_eq!(only_free.as_slice(), &[free]);

        // Object floating away from its placement and from the gripper.
        assert_eq!(graph.states_of(&dvector![0.7, 2.0]), Err(StateLookupError));
    }

    #[test]
    fn edges_between_follows_construction_order() {
        let (graph, free, grasp) = gripper_and_ball();
        let sequences = graph.edges_between(&[free], &[grasp]);
        assert_eq!(sequences.len(), 1);
        assert_eq!(graph.edge(sequences[0][0]).name(), "approach");

        let loops = graph.edges_between(&[free, grasp], &[free, grasp]);
        let names: Vec<_> = loops
            .iter()
            .map(|s| graph.edge(s[0]).name().to_owned())
            .collect();
        assert_eq!(names, ["transit", "approach", "release", "transfer"]);
    }

    #[test]
    fn choose_edge_honors_weights() {
        let (mut graph, free, _) = gripper_and_ball();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            assert!(graph.choose_edge(free, &mut rng).is_some());
        }
        // Disable every outgoing edge of the free state.
        let out: Vec<EdgeId> = graph.state(free).out_edges().to_vec();
        for e in out {
            graph.edge_mut(e).set_weight(0);
        }
        assert_eq!(graph.choose_edge(free, &mut rng), None);
    }

    #[test]
    fn apply_constraints_reaches_the_transition_target() {
        let (mut graph, free, grasp) = gripper_and_ball();
        // Re-shape the approach target so the gripper meets the object.
        let approach = graph.edges_between(&[free], &[grasp])[0][0];
        graph.edge_mut(approach).set_target(
            ConstraintSet::empty("grasped")
                .with(Arc::new(RelativeLock::coincident("hold", vec![(0, 1)]))),
        );

        let near = dvector![-0.8, 0.0];
        let mut q = dvector![0.9, 0.4];
        assert!(graph.edge(approach).apply_constraints(&near, &mut q));
        // The object stayed at the placement of the near configuration and
        // the gripper came to it.
        assert_eq!(q[1], 0.0);
        assert!((q[0] - 0.0).abs() <= 1e-6);
    }

    #[test]
    fn built_paths_carry_the_anchored_leaf() {
        let (graph, free, grasp) = gripper_and_ball();
        let approach = graph.edges_between(&[free], &[grasp])[0][0];
        let from = dvector![-0.5, 0.0];
        let to = dvector![0.0, 0.0];
        let path = graph.edge(approach).build(&from, &to).unwrap();
        let constraint = path.constraint().expect("leaf must be attached");
        assert!(constraint.is_satisfied(&from));
        assert!(constraint.is_satisfied(&path.terminal().unwrap()));

        let aggregated = graph.path_constraint(&[approach]);
        assert!(!aggregated.is_empty());
    }
}
