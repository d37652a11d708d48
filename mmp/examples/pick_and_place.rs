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

//! A planar gripper picking up a ball that lives on a line.
//!
//! The configuration is `[gripper_x, ball_x]`. The ball is either placed at
//! the origin or rigidly attached to the gripper, which gives a constraint
//! graph with two states and four transitions. A small keep-out band blocks
//! part of the gripper's travel so that path validation gets exercised.

use anyhow::Result;
use mmp::prelude::*;
use nalgebra::dvector;
use std::sync::Arc;

fn build_graph() -> ConstraintGraph {
    let steering: Arc<dyn SteeringMethod> = Arc::new(LinearSteering::default());
    let hold = || Arc::new(RelativeLock::coincident("hold", vec![(1, 0)]));
    let placed = || Arc::new(LockedJoints::new("placement", vec![1], vec![0.0]));
    let keep_placement =
        || ConstraintSet::empty("keep placement").with(Arc::new(LockedJoints::new(
            "still",
            vec![1],
            vec![0.0],
        )));
    let keep_grasp = || ConstraintSet::empty("keep grasp").with(hold());

    let mut graph = ConstraintGraph::new("pick and place");
    // The grasp state comes first so grasped configurations resolve to it.
    let grasp = graph.add_state("grasp", ConstraintSet::empty("grasped").with(hold()));
    let free = graph.add_state("free", ConstraintSet::empty("placed").with(placed()));

    let transit = graph.add_edge(
        "transit",
        TransitionKind::FreeMotion,
        free,
        free,
        steering.clone(),
    );
    graph.edge_mut(transit).set_leaf(keep_placement());

    let approach = graph.add_edge(
        "approach",
        TransitionKind::Grasp,
        free,
        grasp,
        steering.clone(),
    );
    graph.edge_mut(approach).set_leaf(keep_placement());
    // Projection must bring the gripper to the ball, not the ball to the
    // gripper.
    graph.edge_mut(approach).set_target(
        ConstraintSet::empty("grasped").with(Arc::new(RelativeLock::coincident(
            "hold",
            vec![(0, 1)],
        ))),
    );

    let release = graph.add_edge(
        "release",
        TransitionKind::Release,
        grasp,
        free,
        steering.clone(),
    );
    graph.edge_mut(release).set_leaf(keep_placement());

    let transfer = graph.add_edge(
        "transfer",
        TransitionKind::FreeMotion,
        grasp,
        grasp,
        steering,
    );
    graph.edge_mut(transfer).set_leaf(keep_grasp());

    graph
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let robot = Arc::new(Robot::new(
        "gripper-and-ball",
        KinematicModel::new(vec![
            Joint::new("gripper_x", -1.0, 1.0),
            Joint::new("ball_x", -1.0, 1.0),
        ]),
    ));

    let graph = Arc::new(build_graph());

    // The gripper may not dwell inside the keep-out band.
    let keep_out = |q: &Configuration| !(0.55..0.7).contains(&q[0]);
    let collision: Arc<dyn PathValidator> =
        Arc::new(DiscretizedValidator::new(Arc::new(keep_out), 0.01));

    let problem = Arc::new(Problem::new(robot, graph.clone(), collision));
    let mut roadmap = problem.make_roadmap();
    roadmap.add_node(dvector![-0.8, 0.0])?;

    let mut planner = ManipulationPlanner::create(problem, roadmap)?.with_seed(13);
    for _ in 0..500 {
        planner.one_step();
    }

    let roadmap = planner.roadmap();
    println!(
        "roadmap: {} nodes, {} edges, {} connected components",
        roadmap.node_count(),
        roadmap.link_count(),
        roadmap.connected_components().len(),
    );
    for state in graph.states() {
        let members = roadmap
            .nodes()
            .filter(|&n| roadmap.node(n).state() == state)
            .count();
        println!("  state {:10} {:>4} nodes", graph.state(state).name(), members);
    }

    let labels = ManipulationPlanner::error_list();
    for edge in graph.edges() {
        let stat = planner.get_edge_stat(edge);
        println!("edge {:10}", graph.edge(edge).name());
        for (label, count) in labels.iter().zip(&stat) {
            if *count > 0 {
                println!("    {label:45} {count:>5}");
            }
        }
    }
    Ok(())
}
