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
    error::{ProjectionError, StateLookupError, ThisError},
    graph::{ConstraintGraph, StateId},
    metric::ConfigDistance,
    path::Path,
    Configuration,
};
use float_ord::FloatOrd;
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

/// Stable handle of a roadmap node. Handles are never re-used, so they also
/// witness insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// Stable handle of a directed roadmap edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub(crate) usize);

/// Handle of a connected component. Stale handles of merged-away components
/// stop appearing in [`Roadmap::connected_components`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) usize);

/// A sampled configuration admitted to the roadmap, together with the
/// constraint-graph state it was assigned and its adjacency.
pub struct Node {
    config: Configuration,
    state: StateId,
    component: usize,
    outgoing: Vec<LinkId>,
    incoming: Vec<LinkId>,
}

impl Node {
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn component(&self) -> ComponentId {
        ComponentId(self.component)
    }

    pub fn out_links(&self) -> &[LinkId] {
        &self.outgoing
    }

    pub fn in_links(&self) -> &[LinkId] {
        &self.incoming
    }
}

/// A directed edge of the roadmap, owning the validated path that joins its
/// endpoint configurations.
pub struct Link {
    from: NodeId,
    to: NodeId,
    path: Path,
}

impl Link {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(ThisError, Debug)]
pub enum RoadmapError {
    #[error(transparent)]
    Lookup(#[from] StateLookupError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Directed multigraph of sampled configurations joined by validated paths,
/// with connected-component tracking and nearest-neighbor lookup partitioned
/// by constraint-graph state.
pub struct Roadmap {
    graph: Arc<ConstraintGraph>,
    metric: Arc<dyn ConfigDistance>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    components: Vec<Option<Vec<NodeId>>>,
    state_index: HashMap<StateId, Vec<NodeId>>,
}

impl Roadmap {
    pub fn new(graph: Arc<ConstraintGraph>, metric: Arc<dyn ConfigDistance>) -> Self {
        Self {
            graph,
            metric,
            nodes: Vec::new(),
            links: Vec::new(),
            components: Vec::new(),
            state_index: HashMap::new(),
        }
    }

    pub fn constraint_graph(&self) -> &Arc<ConstraintGraph> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        (0..self.links.len()).map(LinkId)
    }

    /// Admit an isolated node. The constraint graph assigns its state;
    /// configurations outside every state are rejected. The node starts its
    /// own connected component.
    pub fn add_node(&mut self, config: Configuration) -> Result<NodeId, StateLookupError> {
        let state = self.graph.first_state_of(&config)?;
        let id = NodeId(self.nodes.len());
        let component = self.components.len();
        self.components.push(Some(vec![id]));
        self.nodes.push(Node {
            config,
            state,
            component,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        self.state_index.entry(state).or_default().push(id);
        trace!(node = id.0, state = state.index(), "roadmap node added");
        Ok(id)
    }

    /// Add one directed edge carrying `path`, merging the endpoint
    /// components when they differ.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, path: Path) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link { from, to, path });
        self.nodes[from.0].outgoing.push(id);
        self.nodes[to.0].incoming.push(id);
        self.merge_components(self.nodes[from.0].component, self.nodes[to.0].component);
        id
    }

    /// Atomically admit a node for `config` and join it to `from` in both
    /// directions; the reverse edge carries the time-reversed path. Nothing
    /// is inserted if the configuration has no state or the reversal fails.
    pub fn add_node_and_edges(
        &mut self,
        from: NodeId,
        config: Configuration,
        path: Path,
    ) -> Result<NodeId, RoadmapError> {
        let (t_min, t_max) = path.time_range();
        let reverse = path.extract((t_max, t_min))?;
        let node = self.add_node(config)?;
        self.add_edge(from, node, path);
        self.add_edge(node, from, reverse);
        Ok(node)
    }

    /// Live components, in ascending creation order.
    pub fn connected_components(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ComponentId(i)))
            .collect()
    }

    pub fn component_of(&self, node: NodeId) -> ComponentId {
        ComponentId(self.nodes[node.0].component)
    }

    pub fn nodes_in_component(&self, component: ComponentId) -> &[NodeId] {
        self.components[component.0]
            .as_deref()
            .unwrap_or(&[])
    }

    /// Whether an edge `from -> to` exists.
    pub fn is_out_neighbor(&self, from: NodeId, to: NodeId) -> bool {
        self.nodes[from.0]
            .outgoing
            .iter()
            .any(|l| self.links[l.0].to == to)
    }

    /// Whether an edge `neighbor -> of` exists.
    pub fn is_in_neighbor(&self, of: NodeId, neighbor: NodeId) -> bool {
        self.nodes[of.0]
            .incoming
            .iter()
            .any(|l| self.links[l.0].from == neighbor)
    }

    /// The node of `component` assigned to `state` nearest to `q`, together
    /// with its distance. First-inserted wins ties.
    pub fn nearest_node(
        &self,
        q: &Configuration,
        component: ComponentId,
        state: StateId,
    ) -> Option<(NodeId, f64)> {
        self.nearest_node_before(q, component, state, usize::MAX)
    }

    /// Like [`Self::nearest_node`], restricted to nodes inserted before
    /// `horizon`. This is what gives the planner its within-step snapshot
    /// semantics: candidates admitted later in the same step are invisible.
    pub(crate) fn nearest_node_before(
        &self,
        q: &Configuration,
        component: ComponentId,
        state: StateId,
        horizon: usize,
    ) -> Option<(NodeId, f64)> {
        let mut best: Option<(NodeId, f64)> = None;
        for &id in self.state_index.get(&state).map_or(&[][..], |v| v.as_slice()) {
            if id.0 >= horizon || self.nodes[id.0].component != component.0 {
                continue;
            }
            let d = self.metric.distance(q, &self.nodes[id.0].config);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((id, d));
            }
        }
        best
    }

    /// The `k` nodes of `component` nearest to `q`, any state, nearest
    /// first.
    pub fn k_nearest(
        &self,
        q: &Configuration,
        component: ComponentId,
        k: usize,
    ) -> Vec<NodeId> {
        let mut members: Vec<NodeId> = self.nodes_in_component(component).to_vec();
        members.sort_by_key(|id| FloatOrd(self.metric.distance(q, &self.nodes[id.0].config)));
        members.truncate(k);
        members
    }

    fn merge_components(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        // Move the smaller member list into the larger one.
        let (keep, drop) = {
            let len_a = self.components[a].as_ref().map_or(0, |v| v.len());
            let len_b = self.components[b].as_ref().map_or(0, |v| v.len());
            if len_a >= len_b {
                (a, b)
            } else {
                (b, a)
            }
        };
        let moved = self.components[drop].take().unwrap_or_default();
        for &node in &moved {
            self.nodes[node.0].component = keep;
        }
        if let Some(target) = self.components[keep].as_mut() {
            target.extend(moved);
        }
        trace!(kept = keep, merged = drop, "roadmap components merged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintSet, LockedJoints};
    use crate::metric::Euclidean;
    use crate::steering::{LinearSteering, SteeringMethod};
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    fn free_graph() -> Arc<ConstraintGraph> {
        let mut graph = ConstraintGraph::new("free only");
        graph.add_state("free", ConstraintSet::empty("anything"));
        Arc::new(graph)
    }

    fn roadmap() -> Roadmap {
        Roadmap::new(free_graph(), Arc::new(Euclidean))
    }

    fn steer(from: &Configuration, to: &Configuration) -> Path {
        LinearSteering::default().steer(from, to).unwrap()
    }

    #[test]
    fn nodes_without_a_state_are_rejected() {
        let mut graph = ConstraintGraph::new("restricted");
        graph.add_state(
            "pinned",
            ConstraintSet::empty("pin").with(std::sync::Arc::new(LockedJoints::new(
                "origin",
                vec![0],
                vec![0.0],
            ))),
        );
        let mut roadmap = Roadmap::new(Arc::new(graph), Arc::new(Euclidean));
        assert!(roadmap.add_node(dvector![0.0, 3.0]).is_ok());
        assert_eq!(roadmap.add_node(dvector![1.0, 0.0]), Err(StateLookupError));
        assert_eq!(roadmap.node_count(), 1);
    }

    #[test]
    fn add_node_and_edges_installs_the_reverse_path() {
        let mut roadmap = roadmap();
        let a = roadmap.add_node(dvector![0.0]).unwrap();
        let q_b = dvector![2.0];
        let path = steer(roadmap.node(a).configuration(), &q_b);
        let b = roadmap.add_node_and_edges(a, q_b.clone(), path).unwrap();

        assert_eq!(roadmap.link_count(), 2);
        assert!(roadmap.is_out_neighbor(a, b));
        assert!(roadmap.is_in_neighbor(a, b));
        assert_eq!(roadmap.connected_components().len(), 1);

        let forward = roadmap.link(LinkId(0));
        assert_eq!(forward.path().initial().unwrap(), dvector![0.0]);
        assert_eq!(forward.path().terminal().unwrap(), q_b);
        let backward = roadmap.link(LinkId(1));
        assert_eq!(backward.path().initial().unwrap(), q_b);
        assert_eq!(backward.path().terminal().unwrap(), dvector![0.0]);
        assert_relative_eq!(backward.path().length(), forward.path().length());
    }

    #[test]
    fn components_partition_the_nodes() {
        let mut roadmap = roadmap();
        let a = roadmap.add_node(dvector![0.0]).unwrap();
        let b = roadmap.add_node(dvector![1.0]).unwrap();
        let c = roadmap.add_node(dvector![5.0]).unwrap();
        assert_eq!(roadmap.connected_components().len(), 3);

        let path = steer(roadmap.node(a).configuration(), roadmap.node(b).configuration());
        roadmap.add_edge(a, b, path);
        let components = roadmap.connected_components();
        assert_eq!(components.len(), 2);

        let mut all: Vec<NodeId> = components
            .iter()
            .flat_map(|&cc| roadmap.nodes_in_component(cc).to_vec())
            .collect();
        all.sort();
        assert_eq!(all, vec![a, b, c]);
        assert_eq!(roadmap.component_of(a), roadmap.component_of(b));
        assert_ne!(roadmap.component_of(a), roadmap.component_of(c));
    }

    #[test]
    fn nearest_node_breaks_ties_toward_first_inserted() {
        let mut roadmap = roadmap();
        let a = roadmap.add_node(dvector![-1.0]).unwrap();
        let b = roadmap.add_node(dvector![1.0]).unwrap();
        let path = steer(roadmap.node(a).configuration(), roadmap.node(b).configuration());
        roadmap.add_edge(a, b, path);

        let cc = roadmap.component_of(a);
        let state = roadmap.node(a).state();
        let (winner, d) = roadmap.nearest_node(&dvector![0.0], cc, state).unwrap();
        assert_eq!(winner, a);
        assert_relative_eq!(d, 1.0);

        // Nodes inserted at or past the horizon are invisible.
        assert_eq!(
            roadmap.nearest_node_before(&dvector![0.9], cc, state, 1),
            Some((a, 1.9))
        );
    }

    #[test]
    fn k_nearest_is_restricted_to_the_component() {
        let mut roadmap = roadmap();
        let a = roadmap.add_node(dvector![0.0]).unwrap();
        let b = roadmap.add_node(dvector![0.5]).unwrap();
        let c = roadmap.add_node(dvector![0.8]).unwrap();
        let far = roadmap.add_node(dvector![100.0]).unwrap();
        let ab = steer(roadmap.node(a).configuration(), roadmap.node(b).configuration());
        roadmap.add_edge(a, b, ab);
        let bc = steer(roadmap.node(b).configuration(), roadmap.node(c).configuration());
        roadmap.add_edge(b, c, bc);

        let cc = roadmap.component_of(a);
        let found = roadmap.k_nearest(&dvector![0.9], cc, 2);
        assert_eq!(found, vec![c, b]);
        assert!(!found.contains(&far));
    }
}
