// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing

use super::types::WorkflowDefinition;
use crate::waypoint::error::{WaypointError, WorkflowError};
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, WaypointError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, WaypointError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        log::debug!(
            "Parsed workflow '{}' with {} steps and {} interrupts",
            def.name,
            def.steps.len(),
            def.interrupts.len()
        );
        Ok(def)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
