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
    graph::ConstraintGraph,
    metric::{ConfigDistance, Euclidean},
    path::{Leaf, Motion, Path},
    Configuration,
};
use std::sync::Arc;

/// Builds a candidate path between two configurations. Returning None means
/// the pair cannot be joined under this method's kinematic rules.
pub trait SteeringMethod: Send + Sync {
    fn steer(&self, from: &Configuration, to: &Configuration) -> Option<Path>;
}

/// The outcome of pushing a path onto a constraint manifold.
pub enum Projected {
    /// The whole path was projected.
    Complete(Path),

    /// Only a leading portion of the path could be projected. The portion
    /// may have zero length.
    Truncated(Path),

    /// Nothing of the path could be projected.
    Infeasible,
}

/// Transforms a path into one satisfying a constraint, possibly shortening
/// it in the process.
pub trait PathProjector: Send + Sync {
    fn apply(&self, path: &Path) -> Projected;
}

/// Linear interpolation between two configurations, parametrized by a
/// length chosen at construction.
pub struct StraightMotion {
    from: Configuration,
    to: Configuration,
    length: f64,
}

impl StraightMotion {
    /// A straight segment parametrized by euclidean arc length.
    pub fn new(from: Configuration, to: Configuration) -> Self {
        let length = (&to - &from).norm();
        Self::with_length(from, to, length)
    }

    /// A straight segment with an externally supplied length, e.g. one
    /// measured by a weighted metric.
    pub fn with_length(from: Configuration, to: Configuration, length: f64) -> Self {
        debug_assert_eq!(from.len(), to.len());
        debug_assert!(length >= 0.0);
        Self { from, to, length }
    }
}

impl Motion for StraightMotion {
    fn output_size(&self) -> usize {
        self.from.len()
    }

    fn range(&self) -> (f64, f64) {
        (0.0, self.length)
    }

    fn eval(&self, s: f64) -> Option<Configuration> {
        if s < -1e-9 || s > self.length + 1e-9 {
            return None;
        }
        if self.length == 0.0 {
            return Some(self.from.clone());
        }
        let alpha = (s / self.length).clamp(0.0, 1.0);
        Some(self.from.lerp(&self.to, alpha))
    }
}

/// Straight-line steering, with path length measured by a configurable
/// metric. Always succeeds; a coincident pair yields a zero-length path.
pub struct LinearSteering {
    metric: Arc<dyn ConfigDistance>,
}

impl LinearSteering {
    pub fn new(metric: Arc<dyn ConfigDistance>) -> Self {
        Self { metric }
    }
}

impl Default for LinearSteering {
    fn default() -> Self {
        Self::new(Arc::new(Euclidean))
    }
}

impl SteeringMethod for LinearSteering {
    fn steer(&self, from: &Configuration, to: &Configuration) -> Option<Path> {
        let length = self.metric.distance(from, to);
        let motion = StraightMotion::with_length(from.clone(), to.clone(), length);
        Some(Path::Leaf(Leaf::new(Arc::new(motion))))
    }
}

/// Steers between two configurations along a constraint-graph transition
/// admissible for their modes: candidate edges are enumerated from the
/// states of the endpoints and the first edge whose leaf, anchored at the
/// start, also holds at the goal gets to build the path.
pub struct GraphSteering {
    graph: Arc<ConstraintGraph>,
}

impl GraphSteering {
    pub fn new(graph: Arc<ConstraintGraph>) -> Self {
        Self { graph }
    }
}

impl SteeringMethod for GraphSteering {
    fn steer(&self, from: &Configuration, to: &Configuration) -> Option<Path> {
        let orig = self.graph.states_of(from).ok()?;
        let dest = self.graph.states_of(to).ok()?;
        let mut candidates = self.graph.edges_between(&orig, &dest);
        while let Some(sequence) = candidates.pop() {
            let [edge_id] = sequence.as_slice() else {
                continue;
            };
            let constraint = self
                .graph
                .path_constraint(&sequence)
                .offset_from_config(from);
            if !constraint.is_satisfied(to) {
                continue;
            }
            if let Some(path) = self.graph.edge(*edge_id).build(from, to) {
                return Some(path);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::WeightedDistance;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    #[test]
    fn straight_motion_interpolates_by_arc_length() {
        let motion = StraightMotion::new(dvector![0.0, 0.0], dvector![3.0, 4.0]);
        assert_relative_eq!(motion.range().1, 5.0);
        let mid = motion.eval(2.5).unwrap();
        assert_relative_eq!(mid[0], 1.5);
        assert_relative_eq!(mid[1], 2.0);
        assert!(motion.eval(5.5).is_none());
    }

    #[test]
    fn linear_steering_uses_the_metric_for_length() {
        let steering = LinearSteering::new(Arc::new(WeightedDistance::new(dvector![4.0, 1.0])));
        let path = steering
            .steer(&dvector![0.0, 0.0], &dvector![1.0, 0.0])
            .unwrap();
        assert_relative_eq!(path.length(), 2.0);
        assert_eq!(path.terminal().unwrap(), dvector![1.0, 0.0]);

        let degenerate = steering
            .steer(&dvector![1.0, 1.0], &dvector![1.0, 1.0])
            .unwrap();
        assert_relative_eq!(degenerate.length(), 0.0);
        assert_eq!(degenerate.initial().unwrap(), dvector![1.0, 1.0]);
    }
}
