// SPDX-License-Identifier: MIT

//! State management for workflow runs
//!
//! This module provides:
//! - `WorkflowState` - the versioned record carried from step to step
//! - `WorkflowStatus` - the run lifecycle
//! - `StateSchema` - optional types, reducers and defaults for open fields

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{WorkflowState, WorkflowStatus, RESERVED_FIELDS};
