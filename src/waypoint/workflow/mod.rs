// SPDX-License-Identifier: MIT

//! YAML workflow definitions
//!
//! A definition names steps, edges and interrupts; the [`Builder`] binds
//! each `uses:` kind to a step from the [`StepRegistry`] and each
//! `interrupt:` to a human interaction node.

pub mod builder;
pub mod loader;
pub mod registry;
pub mod types;

pub use builder::{choice_validator, Builder};
pub use loader::WorkflowLoader;
pub use registry::{StepFactory, StepRegistry};
pub use types::{
    BranchDefinition, EdgeDefinition, InterruptDefinition, StepDefinition, WorkflowDefinition,
};
