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

pub use std::error::Error as StdError;
pub use anyhow::Error as Anyhow;
pub use thiserror::Error as ThisError;

/// Use this enum for situations where you are required to provide an Error
/// type but there is no possibility of an error being produced. Since NoError
/// has no variants, it is impossible to instantiate this enum.
#[derive(ThisError, Debug)]
pub enum NoError {}

/// No state of the constraint graph contains the configuration that was
/// looked up. Inside the path validator this is recoverable (the offending
/// path is reported invalid with a zero-length valid part); everywhere else
/// it means the configuration cannot enter the roadmap.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no constraint graph state contains the configuration")]
pub struct StateLookupError;

/// A path could not be projected onto the interval or constraint it was
/// asked to satisfy. Raised by [`Path::extract`][crate::path::Path::extract]
/// and propagated through validation.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("interval ({0}, {1}) is outside the path's time range")]
    OutOfRange(f64, f64),

    #[error("the path constraint is violated at parameter {0}")]
    ConstraintViolated(f64),

    #[error("the path could not be evaluated at parameter {0}")]
    EvalFailed(f64),
}

/// Mismatched capability wiring detected while creating a planner. These are
/// the only errors that abort a planning run; everything that can go wrong
/// inside an iteration is absorbed into the per-edge statistics.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidArgument {
    #[error("the Roadmap is not built on the problem's constraint graph")]
    Roadmap,

    #[error("the Problem's path validation is not bound to its constraint graph")]
    Problem,
}
