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

use crate::{constraint::ConstraintSet, error::ProjectionError, Configuration};
use std::sync::Arc;

/// A closed parameter interval. Passing a reversed interval (upper bound
/// first) to [`Path::extract`] requests the time-reversed sub-path.
pub type Interval = (f64, f64);

/// Numerical slack applied to interval-membership tests on path parameters.
const PARAM_EPS: f64 = 1e-9;

/// A motion primitive produced by a steering method: a map from an
/// increasing parameter range to configurations. Primitives are immutable
/// and shared; [`Leaf`] windows them into (possibly reversed) sub-paths
/// without copying.
pub trait Motion: Send + Sync {
    fn output_size(&self) -> usize;

    /// The increasing parameter range of the primitive.
    fn range(&self) -> Interval;

    /// Evaluate the primitive. Returns None when the underlying map cannot
    /// produce a configuration at `s`.
    fn eval(&self, s: f64) -> Option<Configuration>;
}

/// A window over a motion primitive. The window runs from motion parameter
/// `start` to `end`; `start > end` means the path plays the primitive
/// backwards. Local path time always runs over `(0, length)`.
#[derive(Clone)]
pub struct Leaf {
    motion: Arc<dyn Motion>,
    start: f64,
    end: f64,
    constraint: Option<Arc<ConstraintSet>>,
}

impl Leaf {
    pub fn new(motion: Arc<dyn Motion>) -> Self {
        let (start, end) = motion.range();
        Self {
            motion,
            start,
            end,
            constraint: None,
        }
    }

    pub fn output_size(&self) -> usize {
        self.motion.output_size()
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).abs()
    }

    fn param_at(&self, t: f64) -> f64 {
        if self.end >= self.start {
            self.start + t
        } else {
            self.start - t
        }
    }

    pub fn eval(&self, t: f64) -> Option<Configuration> {
        if t < -PARAM_EPS || t > self.length() + PARAM_EPS {
            return None;
        }
        let t = t.clamp(0.0, self.length());
        self.motion.eval(self.param_at(t))
    }

    fn extract_forward(&self, from: f64, to: f64) -> Leaf {
        Leaf {
            motion: self.motion.clone(),
            start: self.param_at(from),
            end: self.param_at(to),
            constraint: self.constraint.clone(),
        }
    }

    fn reversed(&self) -> Leaf {
        Leaf {
            motion: self.motion.clone(),
            start: self.end,
            end: self.start,
            constraint: self.constraint.clone(),
        }
    }
}

/// An ordered concatenation of sub-paths sharing one output size.
#[derive(Clone)]
pub struct PathVector {
    output_size: usize,
    paths: Vec<Path>,
    constraint: Option<Arc<ConstraintSet>>,
}

impl PathVector {
    pub fn new(output_size: usize) -> Self {
        Self {
            output_size,
            paths: Vec::new(),
            constraint: None,
        }
    }

    pub fn append(&mut self, path: Path) {
        debug_assert_eq!(path.output_size(), self.output_size);
        self.paths.push(path);
    }

    pub fn number_paths(&self) -> usize {
        self.paths.len()
    }

    pub fn path_at_rank(&self, rank: usize) -> &Path {
        &self.paths[rank]
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn length(&self) -> f64 {
        self.paths.iter().map(|p| p.length()).sum()
    }

    pub fn eval(&self, t: f64) -> Option<Configuration> {
        if t < -PARAM_EPS || t > self.length() + PARAM_EPS {
            return None;
        }
        let mut offset = 0.0;
        for (rank, path) in self.paths.iter().enumerate() {
            let len = path.length();
            let last = rank + 1 == self.paths.len();
            if t <= offset + len + PARAM_EPS || last {
                return path.eval((t - offset).clamp(0.0, len));
            }
            offset += len;
        }
        None
    }

    fn extract_forward(&self, from: f64, to: f64) -> Result<Path, ProjectionError> {
        // A zero-length request resolves to a zero-length window of the
        // sub-path that owns the parameter.
        if (to - from).abs() <= PARAM_EPS {
            let mut offset = 0.0;
            for (rank, path) in self.paths.iter().enumerate() {
                let len = path.length();
                let last = rank + 1 == self.paths.len();
                if from <= offset + len + PARAM_EPS || last {
                    let local = (from - offset).clamp(0.0, len);
                    return path.extract((local, local));
                }
                offset += len;
            }
            return Err(ProjectionError::OutOfRange(from, to));
        }

        let mut out = PathVector::new(self.output_size);
        out.constraint = self.constraint.clone();
        let mut offset = 0.0;
        for path in &self.paths {
            let len = path.length();
            let lo = (from - offset).max(0.0);
            let hi = (to - offset).min(len);
            if hi - lo > PARAM_EPS {
                out.append(path.extract((lo, hi))?);
            }
            offset += len;
        }
        Ok(Path::Vector(out))
    }

    fn reversed(&self) -> PathVector {
        PathVector {
            output_size: self.output_size,
            paths: self.paths.iter().rev().map(|p| p.reversed()).collect(),
            constraint: self.constraint.clone(),
        }
    }
}

/// A parametrized path through configuration space: either a single motion
/// primitive window or a composite of sub-paths. Both kinds may carry a
/// constraint set that must hold along the whole path; extraction keeps the
/// constraint and fails if the new endpoints fall off its manifold.
#[derive(Clone)]
pub enum Path {
    Leaf(Leaf),
    Vector(PathVector),
}

impl Path {
    pub fn output_size(&self) -> usize {
        match self {
            Path::Leaf(leaf) => leaf.output_size(),
            Path::Vector(vector) => vector.output_size(),
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Path::Leaf(leaf) => leaf.length(),
            Path::Vector(vector) => vector.length(),
        }
    }

    /// The local time range, always `(0, length)`.
    pub fn time_range(&self) -> Interval {
        (0.0, self.length())
    }

    pub fn eval(&self, t: f64) -> Option<Configuration> {
        match self {
            Path::Leaf(leaf) => leaf.eval(t),
            Path::Vector(vector) => vector.eval(t),
        }
    }

    /// The configuration at the start of the path.
    pub fn initial(&self) -> Option<Configuration> {
        self.eval(0.0)
    }

    /// The configuration at the end of the path.
    pub fn terminal(&self) -> Option<Configuration> {
        self.eval(self.length())
    }

    pub fn constraint(&self) -> Option<&Arc<ConstraintSet>> {
        match self {
            Path::Leaf(leaf) => leaf.constraint.as_ref(),
            Path::Vector(vector) => vector.constraint.as_ref(),
        }
    }

    pub fn with_constraint(mut self, constraint: Arc<ConstraintSet>) -> Path {
        self.set_constraint(constraint);
        self
    }

    pub fn set_constraint(&mut self, constraint: Arc<ConstraintSet>) {
        match self {
            Path::Leaf(leaf) => leaf.constraint = Some(constraint),
            Path::Vector(vector) => vector.constraint = Some(constraint),
        }
    }

    pub fn as_vector(&self) -> Option<&PathVector> {
        match self {
            Path::Vector(vector) => Some(vector),
            Path::Leaf(_) => None,
        }
    }

    /// The same geometry played backwards in time.
    pub fn reversed(&self) -> Path {
        match self {
            Path::Leaf(leaf) => Path::Leaf(leaf.reversed()),
            Path::Vector(vector) => Path::Vector(vector.reversed()),
        }
    }

    /// Extract the sub-path over `interval` of local time. A reversed
    /// interval produces the time-reversed sub-path. Fails when the interval
    /// leaves the path's time range or when an attached constraint does not
    /// hold at the new endpoints.
    pub fn extract(&self, interval: Interval) -> Result<Path, ProjectionError> {
        let (from, to) = interval;
        if from > to {
            return Ok(self.extract((to, from))?.reversed());
        }
        let length = self.length();
        if from < -PARAM_EPS || to > length + PARAM_EPS {
            return Err(ProjectionError::OutOfRange(from, to));
        }
        let from = from.clamp(0.0, length);
        let to = to.clamp(0.0, length);

        let extracted = match self {
            Path::Leaf(leaf) => Path::Leaf(leaf.extract_forward(from, to)),
            Path::Vector(vector) => vector.extract_forward(from, to)?,
        };

        if let Some(constraint) = extracted.constraint() {
            for t in [0.0, extracted.length()] {
                let q = extracted
                    .eval(t)
                    .ok_or(ProjectionError::EvalFailed(t))?;
                if !constraint.is_satisfied(&q) {
                    return Err(ProjectionError::ConstraintViolated(t));
                }
            }
        }
        Ok(extracted)
    }
}

impl std::fmt::Debug for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Path::Leaf(leaf) => f
                .debug_struct("Path::Leaf")
                .field("start", &leaf.start)
                .field("end", &leaf.end)
                .field("constrained", &leaf.constraint.is_some())
                .finish(),
            Path::Vector(vector) => f
                .debug_struct("Path::Vector")
                .field("number_paths", &vector.number_paths())
                .field("length", &vector.length())
                .finish(),
        }
    }
}
