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
    error::ProjectionError,
    graph::ConstraintGraph,
    path::{Path, PathVector},
    Configuration,
};
use std::sync::Arc;
use tracing::debug;

/// Pointwise admissibility of configurations, typically backed by a
/// collision checker over the robot's geometry model.
pub trait ConfigValidator: Send + Sync {
    fn is_valid(&self, q: &Configuration) -> bool;
}

impl<F> ConfigValidator for F
where
    F: Fn(&Configuration) -> bool + Send + Sync,
{
    fn is_valid(&self, q: &Configuration) -> bool {
        self(q)
    }
}

/// A world with no obstacles.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeSpace;

impl ConfigValidator for FreeSpace {
    fn is_valid(&self, _: &Configuration) -> bool {
        true
    }
}

/// The outcome of validating a path. An invalid path carries its longest
/// valid part (a prefix, or a suffix under reverse validation), possibly of
/// zero length; a valid path is its own valid part.
pub enum Validity {
    Valid,
    Invalid(Path),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    /// The valid part, given the path that was validated.
    pub fn valid_part(self, whole: &Path) -> Path {
        match self {
            Validity::Valid => whole.clone(),
            Validity::Invalid(part) => part,
        }
    }
}

/// Validates whole paths. Implementations decide their own notion of
/// admissibility; errors are reserved for paths that cannot even be
/// evaluated or split.
pub trait PathValidator: Send + Sync {
    fn validate(&self, path: &Path, reverse: bool) -> Result<Validity, ProjectionError>;
}

/// Samples a path at a fixed resolution and checks every sample against a
/// [`ConfigValidator`] and against the path's attached constraint set, if
/// any. The valid part ends at the last admissible sample.
pub struct DiscretizedValidator {
    checker: Arc<dyn ConfigValidator>,
    resolution: f64,
}

impl DiscretizedValidator {
    pub fn new(checker: Arc<dyn ConfigValidator>, resolution: f64) -> Self {
        assert!(resolution > 0.0);
        Self {
            checker,
            resolution,
        }
    }

    fn sample_ok(&self, path: &Path, t: f64) -> Result<bool, ProjectionError> {
        let q = path.eval(t).ok_or(ProjectionError::EvalFailed(t))?;
        if !self.checker.is_valid(&q) {
            return Ok(false);
        }
        Ok(path
            .constraint()
            .map_or(true, |c| c.is_satisfied(&q)))
    }
}

impl PathValidator for DiscretizedValidator {
    fn validate(&self, path: &Path, reverse: bool) -> Result<Validity, ProjectionError> {
        let (t_min, t_max) = path.time_range();
        let length = t_max - t_min;
        let steps = ((length / self.resolution).ceil() as usize).max(1);
        let dt = length / steps as f64;
        let time_at = |i: usize| {
            if i == steps {
                t_max
            } else {
                t_min + dt * i as f64
            }
        };

        if length == 0.0 {
            return if self.sample_ok(path, t_min)? {
                Ok(Validity::Valid)
            } else {
                Ok(Validity::Invalid(path.extract((t_min, t_min))?))
            };
        }

        if reverse {
            for i in (0..=steps).rev() {
                if !self.sample_ok(path, time_at(i))? {
                    if i == steps {
                        return Ok(Validity::Invalid(path.extract((t_max, t_max))?));
                    }
                    return Ok(Validity::Invalid(path.extract((time_at(i + 1), t_max))?));
                }
            }
        } else {
            for i in 0..=steps {
                if !self.sample_ok(path, time_at(i))? {
                    if i == 0 {
                        return Ok(Validity::Invalid(path.extract((t_min, t_min))?));
                    }
                    return Ok(Validity::Invalid(path.extract((t_min, time_at(i - 1)))?));
                }
            }
        }
        Ok(Validity::Valid)
    }
}

/// Validates a path against collision and against consistency with the
/// constraint graph: when collision checking shortens a path, the shortened
/// part must still be explained by a transition of the graph, recursively
/// splitting along mode boundaries.
pub struct GraphPathValidator {
    validator: Arc<dyn PathValidator>,
    graph: Arc<ConstraintGraph>,
}

impl GraphPathValidator {
    pub fn new(validator: Arc<dyn PathValidator>, graph: Arc<ConstraintGraph>) -> Self {
        Self { validator, graph }
    }

    pub fn graph(&self) -> &Arc<ConstraintGraph> {
        &self.graph
    }

    pub fn collision_validator(&self) -> &Arc<dyn PathValidator> {
        &self.validator
    }

    /// Validate `path`; on failure the returned [`Validity::Invalid`]
    /// carries the longest prefix (or suffix, under `reverse`) that is both
    /// collision-free and graph-consistent.
    pub fn validate(&self, path: &Path, reverse: bool) -> Result<Validity, ProjectionError> {
        match path {
            Path::Vector(vector) => self.validate_vector(vector, reverse),
            Path::Leaf(_) => self.validate_leaf(path, reverse),
        }
    }

    fn validate_vector(
        &self,
        vector: &PathVector,
        reverse: bool,
    ) -> Result<Validity, ProjectionError> {
        let count = vector.number_paths();
        let ranks: Vec<usize> = if reverse {
            (0..count).rev().collect()
        } else {
            (0..count).collect()
        };
        for rank in ranks {
            // Stop at the first invalid sub-path and keep every fully valid
            // one that came before it.
            if let Validity::Invalid(sub_part) =
                self.validate(vector.path_at_rank(rank), reverse)?
            {
                let mut assembled = PathVector::new(vector.output_size());
                if reverse {
                    // The valid part is a suffix: the partial suffix of this
                    // sub-path, then every fully valid sub-path after it,
                    // kept in ascending time order.
                    assembled.append(sub_part);
                    for v in rank + 1..count {
                        assembled.append(vector.path_at_rank(v).clone());
                    }
                } else {
                    for v in 0..rank {
                        assembled.append(vector.path_at_rank(v).clone());
                    }
                    assembled.append(sub_part);
                }
                return Ok(Validity::Invalid(Path::Vector(assembled)));
            }
        }
        Ok(Validity::Valid)
    }

    fn validate_leaf(&self, path: &Path, reverse: bool) -> Result<Validity, ProjectionError> {
        let no_collision = match self.validator.validate(path, reverse)? {
            Validity::Valid => return Ok(Validity::Valid),
            Validity::Invalid(part) => part,
        };
        let (new_t_min, new_t_max) = no_collision.time_range();
        let (old_t_min, old_t_max) = path.time_range();

        // A configuration without a state means the path could not be
        // projected; the whole path is then considered invalid.
        let lookups = (|| {
            let q_new_min = no_collision.eval(new_t_min)?;
            let q_new_max = no_collision.eval(new_t_max)?;
            let orig = self.graph.states_of(&q_new_min).ok()?;
            let dest = self.graph.states_of(&q_new_max).ok()?;
            let old_orig = self.graph.states_of(&path.eval(old_t_min)?).ok()?;
            let old_dest = self.graph.states_of(&path.eval(old_t_max)?).ok()?;
            Some((q_new_min, q_new_max, orig, dest, old_orig, old_dest))
        })();
        let Some((q_new_min, q_new_max, orig, dest, old_orig, old_dest)) = lookups else {
            debug!("endpoint of a shortened path has no constraint graph state");
            return Ok(Validity::Invalid(path.extract((old_t_min, old_t_min))?));
        };

        // Same modes at both ends: the shortening is a plain collision event
        // on the same transition.
        if orig == old_orig && dest == old_dest {
            return Ok(Validity::Invalid(no_collision));
        }

        // The valid part crossed a mode boundary: find a transition that
        // explains its endpoints and re-validate under that transition's
        // path constraint.
        assert!(
            !reverse,
            "reverse validation of a leaf path across a mode boundary has never been exercised"
        );
        let mut candidates = self.graph.edges_between(&orig, &dest);
        while let Some(sequence) = candidates.pop() {
            let constraint = self
                .graph
                .path_constraint(&sequence)
                .offset_from_config(&q_new_min);
            debug_assert!(constraint.is_satisfied(&q_new_min));
            if constraint.is_satisfied(&q_new_max) {
                let attached = no_collision.with_constraint(Arc::new(constraint));
                let validity = self.validate(&attached, reverse)?;
                return Ok(Validity::Invalid(validity.valid_part(&attached)));
            }
        }
        debug!("no transition explains the endpoints of a shortened path");
        Ok(Validity::Invalid(path.extract((old_t_min, old_t_min))?))
    }
}

impl PathValidator for GraphPathValidator {
    fn validate(&self, path: &Path, reverse: bool) -> Result<Validity, ProjectionError> {
        GraphPathValidator::validate(self, path, reverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintSet};
    use crate::graph::TransitionKind;
    use crate::path::Leaf;
    use crate::steering::{LinearSteering, StraightMotion};
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    /// Membership of a closed interval on one coordinate.
    #[derive(Debug, Clone)]
    struct Band {
        name: String,
        index: usize,
        min: f64,
        max: f64,
    }

    impl Band {
        fn new(name: &str, index: usize, min: f64, max: f64) -> Self {
            Self {
                name: name.to_owned(),
                index,
                min,
                max,
            }
        }
    }

    impl Constraint for Band {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_satisfied(&self, q: &Configuration) -> bool {
            q[self.index] >= self.min && q[self.index] <= self.max
        }

        fn project(&self, q: &mut Configuration) -> bool {
            q[self.index] = q[self.index].clamp(self.min, self.max);
            true
        }

        fn offset_from(&self, _: &Configuration) -> Arc<dyn Constraint> {
            Arc::new(self.clone())
        }
    }

    fn band_set(name: &str, min: f64, max: f64) -> ConstraintSet {
        ConstraintSet::empty(name).with(Arc::new(Band::new(name, 0, min, max)))
    }

    fn segment(from: f64, to: f64) -> Path {
        Path::Leaf(Leaf::new(Arc::new(StraightMotion::new(
            dvector![from],
            dvector![to],
        ))))
    }

    fn free_graph() -> Arc<ConstraintGraph> {
        let mut graph = ConstraintGraph::new("one mode");
        graph.add_state("free", ConstraintSet::empty("anything"));
        Arc::new(graph)
    }

    /// Three adjacent modes on the line and a single declared transition
    /// from the first to the second.
    fn corridor_graph(with_crossing_edge: bool) -> Arc<ConstraintGraph> {
        let mut graph = ConstraintGraph::new("corridor");
        let a = graph.add_state("a", band_set("a", -10.0, 1.0));
        let b = graph.add_state("b", band_set("b", 1.0 + 1e-7, 1.8 - 1e-7));
        let _c = graph.add_state("c", band_set("c", 1.8, 10.0));
        if with_crossing_edge {
            graph.add_edge(
                "enter",
                TransitionKind::FreeMotion,
                a,
                b,
                Arc::new(LinearSteering::default()),
            );
        }
        Arc::new(graph)
    }

    fn blocked_above(limit: f64) -> Arc<dyn ConfigValidator> {
        Arc::new(move |q: &Configuration| q[0] <= limit)
    }

    #[test]
    fn discretized_validator_returns_the_valid_prefix() {
        let validator = DiscretizedValidator::new(blocked_above(1.5), 0.25);
        let path = segment(0.0, 2.0);
        let Validity::Invalid(prefix) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(prefix.length(), 1.5);
        assert_relative_eq!(prefix.terminal().unwrap()[0], 1.5);

        let all_clear = DiscretizedValidator::new(Arc::new(FreeSpace), 0.25);
        assert!(all_clear.validate(&path, false).unwrap().is_valid());
    }

    #[test]
    fn discretized_validator_reverse_returns_the_valid_suffix() {
        let validator =
            DiscretizedValidator::new(Arc::new(|q: &Configuration| q[0] >= 0.5), 0.25);
        let path = segment(0.0, 2.0);
        let Validity::Invalid(suffix) = validator.validate(&path, true).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(suffix.length(), 1.5);
        assert_relative_eq!(suffix.initial().unwrap()[0], 0.5);
        assert_relative_eq!(suffix.terminal().unwrap()[0], 2.0);
    }

    #[test]
    fn vector_validation_keeps_whole_predecessors_and_the_prefix() {
        let inner = Arc::new(DiscretizedValidator::new(blocked_above(1.5), 0.05));
        let validator = GraphPathValidator::new(inner, free_graph());

        let mut vector = PathVector::new(1);
        vector.append(segment(0.0, 1.0));
        vector.append(segment(1.0, 2.0));
        vector.append(segment(2.0, 3.0));
        let path = Path::Vector(vector);

        let Validity::Invalid(part) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        let assembled = part.as_vector().expect("valid part must stay composite");
        assert_eq!(assembled.number_paths(), 2);
        assert_relative_eq!(assembled.path_at_rank(0).length(), 1.0);
        assert_relative_eq!(part.length(), 1.5);
        assert_relative_eq!(part.terminal().unwrap()[0], 1.5);

        // Valid parts are fixed points of validation.
        assert!(validator.validate(&part, false).unwrap().is_valid());
    }

    #[test]
    fn reverse_vector_validation_keeps_the_suffix_in_time_order() {
        let inner = Arc::new(DiscretizedValidator::new(
            Arc::new(|q: &Configuration| q[0] >= 1.5),
            0.05,
        ));
        let validator = GraphPathValidator::new(inner, free_graph());

        let mut vector = PathVector::new(1);
        vector.append(segment(0.0, 1.0));
        vector.append(segment(1.0, 2.0));
        vector.append(segment(2.0, 3.0));
        let path = Path::Vector(vector);

        let Validity::Invalid(part) = validator.validate(&path, true).unwrap() else {
            panic!("expected an invalid path");
        };
        // The partial suffix of the middle sub-path comes first, followed by
        // the fully valid last sub-path, still in ascending time order.
        let assembled = part.as_vector().expect("valid part must stay composite");
        assert_eq!(assembled.number_paths(), 2);
        assert_relative_eq!(assembled.path_at_rank(0).length(), 0.5);
        assert_relative_eq!(part.length(), 1.5);
        assert_relative_eq!(part.initial().unwrap()[0], 1.5);
        assert_relative_eq!(part.eval(0.5).unwrap()[0], 2.0);
        assert_relative_eq!(part.terminal().unwrap()[0], 3.0);

        // Valid suffixes are fixed points of reverse validation.
        assert!(validator.validate(&part, true).unwrap().is_valid());
    }

    #[test]
    fn same_mode_shortening_is_a_plain_collision_event() {
        let inner = Arc::new(DiscretizedValidator::new(blocked_above(1.5), 0.05));
        let validator = GraphPathValidator::new(inner, free_graph());
        let path = segment(0.0, 2.0);
        let Validity::Invalid(part) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(part.length(), 1.5);
        assert!(part.constraint().is_none());
    }

    #[test]
    fn mode_crossing_prefix_is_revalidated_under_the_transition() {
        let inner = Arc::new(DiscretizedValidator::new(blocked_above(1.5), 0.05));
        let validator = GraphPathValidator::new(inner, corridor_graph(true));
        let path = segment(0.0, 2.0);
        let Validity::Invalid(part) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(part.length(), 1.5);
        assert!(
            part.constraint().is_some(),
            "the explaining transition's constraint must ride along"
        );
    }

    #[test]
    fn unexplained_mode_crossing_yields_a_zero_length_part() {
        let inner = Arc::new(DiscretizedValidator::new(blocked_above(1.5), 0.05));
        let validator = GraphPathValidator::new(inner, corridor_graph(false));
        let path = segment(0.0, 2.0);
        let Validity::Invalid(part) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(part.length(), 0.0);
    }

    #[test]
    fn missing_state_at_an_endpoint_invalidates_the_whole_path() {
        let mut graph = ConstraintGraph::new("gap");
        graph.add_state("a", band_set("a", -10.0, 1.0));
        let inner = Arc::new(DiscretizedValidator::new(blocked_above(1.5), 0.05));
        let validator = GraphPathValidator::new(inner, Arc::new(graph));
        let path = segment(0.0, 2.0);
        let Validity::Invalid(part) = validator.validate(&path, false).unwrap() else {
            panic!("expected an invalid path");
        };
        assert_relative_eq!(part.length(), 0.0);
        assert_relative_eq!(part.initial().unwrap()[0], 0.0);
    }
}
