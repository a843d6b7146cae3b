// SPDX-License-Identifier: MIT

//! Workflow builder - turns YAML definitions into executable graphs

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::interrupt::{InterruptConfig, Validation};
use crate::engine::Graph;
use crate::waypoint::error::{WaypointError, WorkflowError};
use crate::waypoint::workflow::loader::WorkflowLoader;
use crate::waypoint::workflow::registry::StepRegistry;
use crate::waypoint::workflow::types::{InterruptDefinition, WorkflowDefinition};

/// Builds graphs from workflow definitions, resolving `uses:` through a
/// [`StepRegistry`]
pub struct Builder {
    loader: WorkflowLoader,
    registry: StepRegistry,
}

impl Builder {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            registry,
        }
    }

    /// Load and build a workflow from a YAML file
    pub async fn build_file<P: AsRef<Path>>(&self, path: P) -> Result<Graph, WaypointError> {
        let def = self.loader.load_workflow(path)?;
        self.build(&def).await
    }

    pub async fn build(&self, def: &WorkflowDefinition) -> Result<Graph, WaypointError> {
        let mut builder = Graph::builder().entry(def.entry.clone());
        if let Some(schema) = &def.state {
            builder = builder.schema(schema.clone());
        }

        for step in &def.steps {
            builder = match (&step.uses, &step.interrupt) {
                (Some(kind), None) => {
                    let node = self.registry.create(&step.id, kind, &step.params).await?;
                    builder.step_arc(step.id.clone(), node)
                }
                (None, Some(name)) => {
                    let interrupt = def.interrupts.get(name).ok_or_else(|| {
                        WorkflowError::UndefinedInterrupt {
                            step: step.id.clone(),
                            interrupt: name.clone(),
                        }
                    })?;
                    builder
                        .interrupt(interrupt_config(name, &step.id, interrupt))
                        .human_interaction_step(name.clone())
                }
                _ => return Err(WorkflowError::AmbiguousStep(step.id.clone()).into()),
            };
        }

        for edge in &def.edges {
            builder = match (&edge.to, edge.branches.is_empty()) {
                (Some(to), true) => builder.edge(edge.from.clone(), to.clone()),
                (None, false) => builder.branches(
                    edge.from.clone(),
                    edge.branches.iter().map(|b| (b.when.clone(), b.to.clone())),
                    edge.otherwise.as_deref(),
                ),
                _ => return Err(WorkflowError::AmbiguousEdge(edge.from.clone()).into()),
            };
        }

        let graph = builder.build()?;
        log::info!(
            "Built workflow '{}' with {} steps",
            def.name,
            graph.step_names().len()
        );
        Ok(graph)
    }
}

fn interrupt_config(kind: &str, step_id: &str, def: &InterruptDefinition) -> InterruptConfig {
    let mut config = InterruptConfig::new(kind, step_id);
    if let Some(message) = &def.message {
        config = config.message(message.clone());
    }
    if let Some(instructions) = &def.instructions {
        config = config.instructions(instructions.clone());
    }
    let options = if def.options.is_empty() {
        def.choices.keys().cloned().collect()
    } else {
        def.options.clone()
    };
    config.options(options).validator(choice_validator(
        def.choices.clone(),
        def.free_text.clone(),
        def.error_message.clone(),
    ))
}

/// Validator matching answers case-insensitively against `choices`.
///
/// A matched choice yields its values. Anything else is stored verbatim
/// in the `free_text` field when one is set, and rejected otherwise.
pub fn choice_validator(
    choices: BTreeMap<String, Map<String, Value>>,
    free_text: Option<String>,
    error_message: Option<String>,
) -> impl Fn(&str, &Map<String, Value>) -> Validation + Send + Sync + 'static {
    let keys: Vec<String> = choices.keys().cloned().collect();
    let error_message = error_message
        .unwrap_or_else(|| format!("Please answer with one of: {}", keys.join(", ")));

    move |raw: &str, _context: &Map<String, Value>| {
        let answer = raw.trim();
        let matched = choices
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(answer));

        match (matched, &free_text) {
            (Some((_, values)), _) => values
                .iter()
                .fold(Validation::accept(), |v, (k, val)| v.with(k.clone(), val.clone())),
            (None, Some(field)) if !answer.is_empty() => {
                Validation::accept_with(field.clone(), raw.to_string())
            }
            _ => Validation::reject(error_message.clone()),
        }
    }
}
