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

use crate::Configuration;
use smallvec::SmallVec;
use std::sync::Arc;

/// Default numerical tolerance for deciding that a constraint holds.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 1e-6;

/// Iteration cap for the alternating projection performed by
/// [`ConstraintSet::project`].
pub const MAX_PROJECTION_ITERATIONS: usize = 40;

/// A numerical constraint over configurations.
///
/// A constraint may be parametrized by a right-hand side: `offset_from`
/// produces the member of the constraint's family that passes through the
/// anchor configuration. Constraints with a fixed right-hand side return a
/// clone of themselves.
pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    fn is_satisfied(&self, q: &Configuration) -> bool;

    /// One projection sweep of `q` toward the constraint manifold. Returns
    /// false if this constraint can never be satisfied from `q`.
    fn project(&self, q: &mut Configuration) -> bool;

    /// Re-anchor the right-hand side so that the constraint holds at
    /// `anchor`.
    fn offset_from(&self, anchor: &Configuration) -> Arc<dyn Constraint>;
}

/// A named conjunction of constraints. Projection alternates over the parts
/// until every part is satisfied or the iteration cap is hit.
#[derive(Clone)]
pub struct ConstraintSet {
    name: String,
    parts: SmallVec<[Arc<dyn Constraint>; 4]>,
}

impl ConstraintSet {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: SmallVec::new(),
        }
    }

    pub fn new(name: impl Into<String>, parts: Vec<Arc<dyn Constraint>>) -> Self {
        Self {
            name: name.into(),
            parts: SmallVec::from_vec(parts),
        }
    }

    pub fn with(mut self, part: Arc<dyn Constraint>) -> Self {
        self.parts.push(part);
        self
    }

    pub fn push(&mut self, part: Arc<dyn Constraint>) {
        self.parts.push(part);
    }

    /// Append every part of `other`.
    pub fn merge(&mut self, other: &ConstraintSet) {
        self.parts.extend(other.parts.iter().cloned());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_satisfied(&self, q: &Configuration) -> bool {
        self.parts.iter().all(|c| c.is_satisfied(q))
    }

    /// Project `q` onto the intersection of all parts, in place. Returns
    /// false when the projection does not converge within
    /// [`MAX_PROJECTION_ITERATIONS`] sweeps or a part reports failure.
    pub fn project(&self, q: &mut Configuration) -> bool {
        if self.parts.is_empty() {
            return true;
        }
        for _ in 0..MAX_PROJECTION_ITERATIONS {
            for part in &self.parts {
                if !part.project(q) {
                    return false;
                }
            }
            if self.is_satisfied(q) {
                return true;
            }
        }
        false
    }

    /// Re-anchor every part so that the set holds at `anchor`.
    pub fn offset_from_config(&self, anchor: &Configuration) -> ConstraintSet {
        Self {
            name: self.name.clone(),
            parts: self.parts.iter().map(|c| c.offset_from(anchor)).collect(),
        }
    }
}

impl std::fmt::Debug for ConstraintSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintSet")
            .field("name", &self.name)
            .field(
                "parts",
                &self.parts.iter().map(|c| c.name().to_owned()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Pins a subset of coordinates to reference values. Re-anchoring takes the
/// reference values from the anchor configuration, which makes this suitable
/// both for placements (fixed right-hand side) and for "the object does not
/// move while the robot transits" leaves.
#[derive(Debug, Clone)]
pub struct LockedJoints {
    name: String,
    indices: Vec<usize>,
    values: Vec<f64>,
    tolerance: f64,
}

impl LockedJoints {
    pub fn new(name: impl Into<String>, indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(indices.len(), values.len());
        Self {
            name: name.into(),
            indices,
            values,
            tolerance: DEFAULT_ERROR_THRESHOLD,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl Constraint for LockedJoints {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied(&self, q: &Configuration) -> bool {
        self.indices
            .iter()
            .zip(&self.values)
            .all(|(&i, &v)| (q[i] - v).abs() <= self.tolerance)
    }

    fn project(&self, q: &mut Configuration) -> bool {
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            q[i] = v;
        }
        true
    }

    fn offset_from(&self, anchor: &Configuration) -> Arc<dyn Constraint> {
        Arc::new(Self {
            name: self.name.clone(),
            indices: self.indices.clone(),
            values: self.indices.iter().map(|&i| anchor[i]).collect(),
            tolerance: self.tolerance,
        })
    }
}

/// Holds pairwise coordinate offsets: for each pair `(follower, leader)`,
/// `q[follower] - q[leader]` must equal the recorded gap. Projection moves
/// the follower. Models a rigid grasp: the object coordinates follow the
/// gripper's.
#[derive(Debug, Clone)]
pub struct RelativeLock {
    name: String,
    pairs: Vec<(usize, usize)>,
    gaps: Vec<f64>,
    tolerance: f64,
}

impl RelativeLock {
    pub fn new(name: impl Into<String>, pairs: Vec<(usize, usize)>, gaps: Vec<f64>) -> Self {
        assert_eq!(pairs.len(), gaps.len());
        Self {
            name: name.into(),
            pairs,
            gaps,
            tolerance: DEFAULT_ERROR_THRESHOLD,
        }
    }

    /// A lock with all gaps at zero: follower coordinates coincide with
    /// their leaders.
    pub fn coincident(name: impl Into<String>, pairs: Vec<(usize, usize)>) -> Self {
        let gaps = vec![0.0; pairs.len()];
        Self::new(name, pairs, gaps)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl Constraint for RelativeLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_satisfied(&self, q: &Configuration) -> bool {
        self.pairs
            .iter()
            .zip(&self.gaps)
            .all(|(&(a, b), &gap)| (q[a] - q[b] - gap).abs() <= self.tolerance)
    }

    fn project(&self, q: &mut Configuration) -> bool {
        for (&(a, b), &gap) in self.pairs.iter().zip(&self.gaps) {
            q[a] = q[b] + gap;
        }
        true
    }

    fn offset_from(&self, anchor: &Configuration) -> Arc<dyn Constraint> {
        Arc::new(Self {
            name: self.name.clone(),
            pairs: self.pairs.clone(),
            gaps: self
                .pairs
                .iter()
                .map(|&(a, b)| anchor[a] - anchor[b])
                .collect(),
            tolerance: self.tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn locked_joints_project_and_reanchor() {
        let lock = LockedJoints::new("ball", vec![2], vec![0.5]);
        let mut q = dvector![0.0, 0.0, 2.0];
        assert!(!lock.is_satisfied(&q));
        assert!(lock.project(&mut q));
        assert_eq!(q[2], 0.5);

        let anchored = lock.offset_from(&dvector![0.0, 0.0, -0.25]);
        let mut q = dvector![1.0, 1.0, 1.0];
        assert!(anchored.project(&mut q));
        assert_eq!(q[2], -0.25);
    }

    #[test]
    fn relative_lock_follows_the_leader() {
        let grasp = RelativeLock::coincident("grasp", vec![(2, 0)]);
        let mut q = dvector![0.75, 0.0, -1.0];
        assert!(grasp.project(&mut q));
        assert_eq!(q[2], 0.75);
        assert!(grasp.is_satisfied(&q));

        let anchored = grasp.offset_from(&dvector![1.0, 0.0, 1.5]);
        let q = dvector![0.0, 0.0, 0.5];
        assert!(anchored.is_satisfied(&q));
    }

    #[test]
    fn set_projection_alternates_until_converged() {
        // The object is pinned at its placement while the gripper is asked
        // to meet it.
        let set = ConstraintSet::empty("approach")
            .with(Arc::new(LockedJoints::new("ball", vec![2], vec![0.5])))
            .with(Arc::new(RelativeLock::coincident("meet", vec![(0, 2)])));
        let mut q = dvector![-0.9, 0.3, 2.0];
        assert!(set.project(&mut q));
        assert!(set.is_satisfied(&q));
        assert_eq!(q[2], 0.5);
        assert!((q[0] - 0.5).abs() <= DEFAULT_ERROR_THRESHOLD);
        // Untouched coordinate stays put.
        assert_eq!(q[1], 0.3);
    }

    #[test]
    fn empty_set_is_always_satisfied() {
        let set = ConstraintSet::empty("free");
        let mut q = dvector![1.0, 2.0];
        assert!(set.is_satisfied(&q));
        assert!(set.project(&mut q));
        assert_eq!(q, dvector![1.0, 2.0]);
    }
}
