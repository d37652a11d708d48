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
    metric::{ConfigDistance, WeightedDistance},
    robot::Robot,
    roadmap::Roadmap,
    steering::{GraphSteering, PathProjector, SteeringMethod},
    validation::{GraphPathValidator, PathValidator},
    Configuration,
};
use nalgebra::DVector;
use rand::{Rng, RngCore};
use std::sync::Arc;

/// Draws random configurations for the planner to extend toward.
pub trait ConfigurationShooter: Send + Sync {
    fn shoot(&self, rng: &mut dyn RngCore) -> Configuration;
}

/// Samples every joint uniformly within its bounds.
pub struct UniformShooter {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl UniformShooter {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn for_robot(robot: &Robot) -> Self {
        let (lower, upper) = robot.model().bounds();
        Self::new(lower, upper)
    }
}

impl ConfigurationShooter for UniformShooter {
    fn shoot(&self, rng: &mut dyn RngCore) -> Configuration {
        DVector::from_iterator(
            self.lower.len(),
            self.lower.iter().zip(self.upper.iter()).map(|(&l, &u)| {
                if u > l {
                    rng.gen_range(l..u)
                } else {
                    l
                }
            }),
        )
    }
}

/// The capability bundle a manipulation planner runs against: the robot,
/// the constraint graph, and the sampling, steering, projection, validation
/// and metric capabilities. Built once, then read-only to the planner.
pub struct Problem {
    robot: Arc<Robot>,
    graph: Arc<ConstraintGraph>,
    shooter: Arc<dyn ConfigurationShooter>,
    steering: Arc<dyn SteeringMethod>,
    projector: Option<Arc<dyn PathProjector>>,
    validation: Arc<GraphPathValidator>,
    distance: Arc<dyn ConfigDistance>,
}

impl Problem {
    /// Assemble a problem with default capabilities: uniform shooting over
    /// the robot's joint bounds, graph-aware steering, weighted joint-space
    /// distance, and graph-aware validation wrapping `collision`.
    pub fn new(
        robot: Arc<Robot>,
        graph: Arc<ConstraintGraph>,
        collision: Arc<dyn PathValidator>,
    ) -> Self {
        let shooter = Arc::new(UniformShooter::for_robot(&robot));
        let steering = Arc::new(GraphSteering::new(graph.clone()));
        let distance = Arc::new(WeightedDistance::for_robot(&robot));
        let validation = Arc::new(GraphPathValidator::new(collision, graph.clone()));
        Self {
            robot,
            graph,
            shooter,
            steering,
            projector: None,
            validation,
            distance,
        }
    }

    pub fn with_shooter(mut self, shooter: Arc<dyn ConfigurationShooter>) -> Self {
        self.shooter = shooter;
        self
    }

    pub fn with_steering_method(mut self, steering: Arc<dyn SteeringMethod>) -> Self {
        self.steering = steering;
        self
    }

    pub fn with_path_projector(mut self, projector: Arc<dyn PathProjector>) -> Self {
        self.projector = Some(projector);
        self
    }

    pub fn with_distance(mut self, distance: Arc<dyn ConfigDistance>) -> Self {
        self.distance = distance;
        self
    }

    /// Replace the graph-aware validation wholesale. The planner refuses a
    /// problem whose validation watches a different constraint graph.
    pub fn with_path_validation(mut self, validation: Arc<GraphPathValidator>) -> Self {
        self.validation = validation;
        self
    }

    pub fn robot(&self) -> &Arc<Robot> {
        &self.robot
    }

    pub fn constraint_graph(&self) -> &Arc<ConstraintGraph> {
        &self.graph
    }

    pub fn configuration_shooter(&self) -> &Arc<dyn ConfigurationShooter> {
        &self.shooter
    }

    pub fn steering_method(&self) -> &Arc<dyn SteeringMethod> {
        &self.steering
    }

    pub fn path_projector(&self) -> Option<&Arc<dyn PathProjector>> {
        self.projector.as_ref()
    }

    pub fn path_validation(&self) -> &Arc<GraphPathValidator> {
        &self.validation
    }

    pub fn distance(&self) -> &Arc<dyn ConfigDistance> {
        &self.distance
    }

    /// An empty roadmap bound to this problem's graph and metric.
    pub fn make_roadmap(&self) -> Roadmap {
        Roadmap::new(self.graph.clone(), self.distance.clone())
    }
}
