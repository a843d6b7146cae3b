// SPDX-License-Identifier: MIT

//! Workflow graphs and the engine that runs them
//!
//! A [`Graph`] is built once per workflow definition with a
//! [`GraphBuilder`] and shared by every run. The [`Engine`] pairs a graph
//! with a checkpoint store and exposes `run`/`resume`.

mod builder;
mod executor;
mod types;

pub use builder::{Graph, GraphBuilder};
pub use executor::{is_cancel_command, new_thread_id, Engine, CANCELLED_BY_USER, DEFAULT_MAX_STEPS};
pub use types::{Branch, EngineEvent, RouteFn, RunResult, RunStatus, Transition, END};
