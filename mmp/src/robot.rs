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
use nalgebra::{DVector, Vector3};
use std::collections::HashMap;

/// One degree of freedom of the kinematic model. The weight scales this
/// joint's contribution to the configuration-space metric.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub weight: f64,
}

impl Joint {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// The joint-space structure of a robot: an ordered list of bounded joints.
/// The configuration size of the robot is the number of joints.
#[derive(Debug, Clone, Default)]
pub struct KinematicModel {
    joints: Vec<Joint>,
}

impl KinematicModel {
    pub fn new(joints: Vec<Joint>) -> Self {
        Self { joints }
    }

    pub fn config_size(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn add_joint(&mut self, joint: Joint) -> usize {
        self.joints.push(joint);
        self.joints.len() - 1
    }

    /// Lower and upper bounds of every joint, as two stacked vectors.
    pub fn bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let lower = DVector::from_iterator(self.joints.len(), self.joints.iter().map(|j| j.lower));
        let upper = DVector::from_iterator(self.joints.len(), self.joints.iter().map(|j| j.upper));
        (lower, upper)
    }

    pub fn weights(&self) -> DVector<f64> {
        DVector::from_iterator(self.joints.len(), self.joints.iter().map(|j| j.weight))
    }

    /// The configuration in the middle of every joint range.
    pub fn neutral_configuration(&self) -> Configuration {
        DVector::from_iterator(
            self.joints.len(),
            self.joints.iter().map(|j| 0.5 * (j.lower + j.upper)),
        )
    }
}

/// A graspable frame on a manipulated object.
#[derive(Debug, Clone)]
pub struct Handle {
    pub name: String,
    pub link: String,
    pub position: Vector3<f64>,
    pub clearance: f64,
}

/// An end-effector frame able to grasp handles.
#[derive(Debug, Clone)]
pub struct Gripper {
    pub name: String,
    pub link: String,
    pub clearance: f64,
}

/// A polygonal contact surface attached to a link, used for placements.
#[derive(Debug, Clone)]
pub struct Surface {
    pub name: String,
    pub link: String,
    pub polygon: Vec<Vector3<f64>>,
}

/// Name-keyed registries of the manipulation-specific elements of a robot.
///
/// Each kind lives in its own map. Anything that needs to treat the kinds
/// uniformly should do so at its own seam instead of relying on a shared
/// base type.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub handles: HashMap<String, Handle>,
    pub grippers: HashMap<String, Gripper>,
    pub surfaces: HashMap<String, Surface>,
    pub joint_groups: HashMap<String, Vec<String>>,
}

impl Catalogs {
    pub fn add_handle(&mut self, handle: Handle) {
        self.handles.insert(handle.name.clone(), handle);
    }

    pub fn add_gripper(&mut self, gripper: Gripper) {
        self.grippers.insert(gripper.name.clone(), gripper);
    }

    pub fn add_surface(&mut self, surface: Surface) {
        self.surfaces.insert(surface.name.clone(), surface);
    }

    /// Register a named group of joints, e.g. all the joints that move when
    /// an object is free-floating.
    pub fn add_joint_group(&mut self, name: impl Into<String>, joints: Vec<String>) {
        self.joint_groups.insert(name.into(), joints);
    }
}

/// A robot that manipulates objects: a kinematic model composed with the
/// catalogs of handles, grippers, and contact surfaces that the constraint
/// graph is built from. Collision geometry is consumed through the
/// [`ConfigValidator`][crate::validation::ConfigValidator] capability and is
/// deliberately not owned here.
#[derive(Debug, Clone)]
pub struct Robot {
    name: String,
    model: KinematicModel,
    catalogs: Catalogs,
}

impl Robot {
    pub fn new(name: impl Into<String>, model: KinematicModel) -> Self {
        Self {
            name: name.into(),
            model,
            catalogs: Catalogs::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_size(&self) -> usize {
        self.model.config_size()
    }

    pub fn model(&self) -> &KinematicModel {
        &self.model
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn catalogs_mut(&mut self) -> &mut Catalogs {
        &mut self.catalogs
    }
}
