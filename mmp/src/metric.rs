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

use crate::{robot::Robot, Configuration};
use nalgebra::DVector;

/// Distance over configuration space. Drives nearest-neighbor queries and
/// the parametrization of straight-line steering.
pub trait ConfigDistance: Send + Sync {
    fn distance(&self, a: &Configuration, b: &Configuration) -> f64;
}

/// Plain euclidean joint-space distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl ConfigDistance for Euclidean {
    fn distance(&self, a: &Configuration, b: &Configuration) -> f64 {
        (a - b).norm()
    }
}

/// Joint-space distance with one weight per joint.
#[derive(Debug, Clone)]
pub struct WeightedDistance {
    weights: DVector<f64>,
}

impl WeightedDistance {
    pub fn new(weights: DVector<f64>) -> Self {
        Self { weights }
    }

    /// Weights taken from the robot's joint declarations.
    pub fn for_robot(robot: &Robot) -> Self {
        Self::new(robot.model().weights())
    }
}

impl ConfigDistance for WeightedDistance {
    fn distance(&self, a: &Configuration, b: &Configuration) -> f64 {
        debug_assert_eq!(a.len(), self.weights.len());
        a.iter()
            .zip(b.iter())
            .zip(self.weights.iter())
            .map(|((x, y), w)| w * (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }
}
