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

use super::state::StateId;
use crate::{
    constraint::ConstraintSet,
    path::Path,
    steering::{PathProjector, SteeringMethod},
    Configuration,
};
use std::sync::Arc;

/// Stable handle of a transition in its
/// [`ConstraintGraph`][super::ConstraintGraph] arena. Also the key of the
/// planner's per-edge statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// What a transition does to the grasp arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Moves the robot without touching any object.
    FreeMotion,

    /// Acquires a grasp.
    Grasp,

    /// Releases a grasp.
    Release,

    /// Exchanges one grasp for another.
    Regrasp,
}

/// A feasible mode transition.
///
/// The leaf constraint set is what must hold along the transition's
/// continuous path; it is re-anchored at the near configuration whenever the
/// edge is exercised. The target constraint set, captured from the
/// destination state when the edge is inserted, is what projection must
/// additionally reach.
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) name: String,
    pub(crate) from: StateId,
    pub(crate) to: StateId,
    pub(crate) kind: TransitionKind,
    pub(crate) weight: usize,
    pub(crate) leaf: ConstraintSet,
    pub(crate) target: ConstraintSet,
    pub(crate) steering: Arc<dyn SteeringMethod>,
    pub(crate) projector: Option<Arc<dyn PathProjector>>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn from(&self) -> StateId {
        self.from
    }

    pub fn to(&self) -> StateId {
        self.to
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Relative probability of this edge being drawn by
    /// [`ConstraintGraph::choose_edge`][super::ConstraintGraph::choose_edge].
    /// Weight zero disables the edge.
    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn set_weight(&mut self, weight: usize) {
        self.weight = weight;
    }

    /// The constraints that hold across this transition's continuous path.
    pub fn leaf(&self) -> &ConstraintSet {
        &self.leaf
    }

    pub fn set_leaf(&mut self, leaf: ConstraintSet) {
        self.leaf = leaf;
    }

    /// The constraints projection must reach for the transition to land in
    /// its destination state. Captured from the destination state at
    /// insertion; replace it when the destination's constraints are not
    /// oriented the way projection should move, e.g. a grasp acquisition
    /// where the gripper must come to the object rather than the object to
    /// the gripper.
    pub fn target(&self) -> &ConstraintSet {
        &self.target
    }

    pub fn set_target(&mut self, target: ConstraintSet) {
        self.target = target;
    }

    pub fn projector(&self) -> Option<&Arc<dyn PathProjector>> {
        self.projector.as_ref()
    }

    pub fn set_projector(&mut self, projector: Arc<dyn PathProjector>) {
        self.projector = Some(projector);
    }

    /// Project `q` in place onto this transition's goal manifold: the
    /// destination state's constraints together with the leaf anchored at
    /// `anchor`. Returns false when the projection does not converge.
    pub fn apply_constraints(&self, anchor: &Configuration, q: &mut Configuration) -> bool {
        let mut goal = self.target.clone();
        goal.merge(&self.leaf.offset_from_config(anchor));
        goal.project(q)
    }

    /// Invoke the edge's steering method and attach the anchored leaf as
    /// the path's constraint.
    pub fn build(&self, from: &Configuration, to: &Configuration) -> Option<Path> {
        let path = self.steering.steer(from, to)?;
        if self.leaf.is_empty() {
            return Some(path);
        }
        Some(path.with_constraint(Arc::new(self.leaf.offset_from_config(from))))
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("kind", &self.kind)
            .field("weight", &self.weight)
            .finish()
    }
}
