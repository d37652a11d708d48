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

//! Multi-modal manipulation motion planning: a randomized roadmap planner
//! that explores a robot's configuration space while staying consistent
//! with a constraint graph of manipulation modes (grasping, placing, free
//! motion) and the transitions between them.

pub mod constraint;

pub mod error;

pub mod graph;
pub use graph::ConstraintGraph;

pub mod metric;

pub mod path;
pub use path::Path;

pub mod planner;
pub use planner::ManipulationPlanner;

pub mod problem;
pub use problem::Problem;

pub mod roadmap;
pub use roadmap::Roadmap;

pub mod robot;
pub use robot::Robot;

pub mod statistics;

pub mod steering;

pub mod validation;

/// A point in the robot's joint space.
pub type Configuration = nalgebra::DVector<f64>;

pub mod prelude {
    pub use super::constraint::{Constraint, ConstraintSet, LockedJoints, RelativeLock};
    pub use super::graph::{ConstraintGraph, EdgeId, StateId, TransitionKind};
    pub use super::metric::{ConfigDistance, Euclidean, WeightedDistance};
    pub use super::path::{Leaf, Motion, Path, PathVector};
    pub use super::planner::ManipulationPlanner;
    pub use super::problem::{ConfigurationShooter, Problem, UniformShooter};
    pub use super::roadmap::Roadmap;
    pub use super::robot::{Joint, KinematicModel, Robot};
    pub use super::steering::{LinearSteering, PathProjector, SteeringMethod};
    pub use super::validation::{
        ConfigValidator, DiscretizedValidator, FreeSpace, GraphPathValidator, PathValidator,
    };
    pub use super::Configuration;
}
