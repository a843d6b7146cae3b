// SPDX-License-Identifier: MIT

//! Built-in workflows

pub mod collaboration;
pub mod outreach;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::{Engine, Graph};
use crate::waypoint::config::Settings;
use crate::waypoint::error::{WaypointError, WorkflowError};

use collaboration::BraveSearchProvider;
use outreach::LogSender;

/// Names and one-line descriptions of the built-in workflows
pub const BUILTIN: [(&str, &str); 2] = [
    (
        outreach::NAME,
        "Confirm, edit or skip a direct message to each listed Instagram profile",
    ),
    (
        collaboration::NAME,
        "Search the web for Instagram accounts in a niche and collect contact hints",
    ),
];

/// Build the graph of a built-in workflow with its default collaborators
pub fn build(name: &str, settings: &Settings) -> Result<Graph, WaypointError> {
    let graph = match name {
        outreach::NAME => outreach::build(&settings.outreach, Arc::new(LogSender))?,
        collaboration::NAME => collaboration::build(
            &settings.collaboration,
            Arc::new(BraveSearchProvider::new(settings.brave_api_key.clone())),
        )?,
        other => return Err(WorkflowError::UnknownWorkflow(other.to_string()).into()),
    };
    Ok(graph)
}

/// An engine for `graph`, backed by the configured checkpoint store
pub fn engine_for(name: &str, graph: Graph, settings: &Settings) -> Result<Engine, WaypointError> {
    let store = settings.checkpoint_store(name)?;
    Ok(Engine::new(graph, store).with_max_steps(settings.max_steps))
}

/// Engines for every built-in workflow, keyed by name
pub fn engines(settings: &Settings) -> Result<BTreeMap<String, Arc<Engine>>, WaypointError> {
    let mut engines = BTreeMap::new();
    for (name, _) in BUILTIN {
        let graph = build(name, settings)?;
        engines.insert(name.to_string(), Arc::new(engine_for(name, graph, settings)?));
    }
    Ok(engines)
}
