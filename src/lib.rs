// SPDX-License-Identifier: MIT

//! waypoint-rs: a resumable workflow engine with human-in-the-loop interrupts
//!
//! - `engine` - the generic toolkit: state, graph, interrupts, checkpoints,
//!   cancellation and the run/resume executor
//! - `waypoint` - the application tier: configuration, YAML workflow
//!   definitions, built-in workflows and the HTTP server

pub mod engine;
pub mod waypoint;
