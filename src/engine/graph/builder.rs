// SPDX-License-Identifier: MIT

//! Graph definition and validation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::types::{Branch, RouteFn, Transition, END};
use crate::engine::condition;
use crate::engine::error::GraphError;
use crate::engine::interrupt::{HumanInteractionNode, InteractionHooks, InterruptConfig};
use crate::engine::state::{StateSchema, WorkflowState};
use crate::engine::step::Step;

/// A validated workflow definition: steps, edges and interrupt configs.
///
/// Immutable once built and shared by every run of the workflow.
pub struct Graph {
    entry: String,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    transitions: HashMap<String, Transition>,
    interrupts: HashMap<String, Arc<InterruptConfig>>,
    schema: Option<Arc<StateSchema>>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(name)
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Step names in declaration order
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    pub fn interrupt(&self, kind: &str) -> Option<&Arc<InterruptConfig>> {
        self.interrupts.get(kind)
    }

    pub fn schema(&self) -> Option<&Arc<StateSchema>> {
        self.schema.as_ref()
    }

    /// Fresh state for a new run, positioned at the entry step
    pub fn initial_state(&self, input: impl Into<String>) -> WorkflowState {
        let state = WorkflowState::new(input, self.entry.clone());
        match &self.schema {
            Some(schema) => state.with_schema(schema.clone()),
            None => state,
        }
    }

    /// Resolve the step after `from`. Runtime routing results are checked
    /// against the graph so a bad routing function cannot strand a run.
    pub fn next_step(&self, from: &str, state: &WorkflowState) -> Result<String, GraphError> {
        let transition = self
            .transitions
            .get(from)
            .ok_or_else(|| GraphError::MissingTransition(from.to_string()))?;
        let next = transition.resolve(from, state)?;
        if next != END && !self.steps.contains_key(&next) {
            return Err(GraphError::UnknownRoute {
                from: from.to_string(),
                target: next,
            });
        }
        Ok(next)
    }
}

enum StepSpec {
    Step(Arc<dyn Step>),
    Interaction {
        kind: String,
        hooks: Option<Arc<dyn InteractionHooks>>,
    },
}

enum EdgeSpec {
    Direct(String),
    Route(RouteFn, Option<HashMap<String, String>>),
    Branches(Vec<(String, String)>, Option<String>),
}

/// Collects steps, edges and interrupts; [`GraphBuilder::build`] validates
/// the whole definition at once.
#[derive(Default)]
pub struct GraphBuilder {
    entry: Option<String>,
    steps: Vec<(Option<String>, StepSpec)>,
    edges: Vec<(String, EdgeSpec)>,
    interrupts: Vec<InterruptConfig>,
    schema: Option<StateSchema>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.steps
            .push((Some(name.into()), StepSpec::Step(Arc::new(step))));
        self
    }

    pub fn step_arc(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.push((Some(name.into()), StepSpec::Step(step)));
        self
    }

    /// Register an interrupt config; one per interrupt type
    pub fn interrupt(mut self, config: InterruptConfig) -> Self {
        self.interrupts.push(config);
        self
    }

    /// Add a human interaction node named after the config's `step_name`
    pub fn human_interaction_step(mut self, interrupt_type: impl Into<String>) -> Self {
        self.steps.push((
            None,
            StepSpec::Interaction {
                kind: interrupt_type.into(),
                hooks: None,
            },
        ));
        self
    }

    pub fn human_interaction_step_with_hooks(
        mut self,
        interrupt_type: impl Into<String>,
        hooks: Arc<dyn InteractionHooks>,
    ) -> Self {
        self.steps.push((
            None,
            StepSpec::Interaction {
                kind: interrupt_type.into(),
                hooks: Some(hooks),
            },
        ));
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), EdgeSpec::Direct(to.into())));
        self
    }

    /// Route with a function returning a step name or [`END`]
    pub fn route<F>(mut self, from: impl Into<String>, route: F) -> Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        self.edges
            .push((from.into(), EdgeSpec::Route(Arc::new(route), None)));
        self
    }

    /// Route with a function returning a key of `path_map`
    pub fn route_with_map<F, I, K, V>(mut self, from: impl Into<String>, route: F, path_map: I) -> Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = path_map
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.edges
            .push((from.into(), EdgeSpec::Route(Arc::new(route), Some(map))));
        self
    }

    /// Conditional edges as `(condition, target)` pairs, tried in order
    pub fn branches<I, C, T>(
        mut self,
        from: impl Into<String>,
        branches: I,
        otherwise: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<String>,
    {
        let branches = branches
            .into_iter()
            .map(|(c, t)| (c.into(), t.into()))
            .collect();
        self.edges.push((
            from.into(),
            EdgeSpec::Branches(branches, otherwise.map(str::to_string)),
        ));
        self
    }

    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;

        let mut interrupts: HashMap<String, Arc<InterruptConfig>> = HashMap::new();
        for config in self.interrupts {
            if interrupts.contains_key(&config.kind) {
                return Err(GraphError::DuplicateInterrupt(config.kind));
            }
            interrupts.insert(config.kind.clone(), Arc::new(config));
        }

        let mut steps: HashMap<String, Arc<dyn Step>> = HashMap::new();
        let mut order = Vec::new();
        for (name, spec) in self.steps {
            let (name, step) = match spec {
                StepSpec::Step(step) => (name.unwrap_or_default(), step),
                StepSpec::Interaction { kind, hooks } => {
                    let config = interrupts
                        .get(&kind)
                        .cloned()
                        .ok_or(GraphError::UnknownInterrupt(kind))?;
                    let name = config.step_name.clone();
                    let node: Arc<dyn Step> = match hooks {
                        Some(hooks) => Arc::new(HumanInteractionNode::with_hooks(config, hooks)),
                        None => Arc::new(HumanInteractionNode::new(config)),
                    };
                    (name, node)
                }
            };
            if name == END || steps.contains_key(&name) {
                return Err(GraphError::DuplicateStep(name));
            }
            order.push(name.clone());
            steps.insert(name, step);
        }

        if !steps.contains_key(&entry) {
            return Err(GraphError::UnknownStep(entry));
        }

        let mut transitions = HashMap::new();
        for (from, spec) in self.edges {
            if !steps.contains_key(&from) {
                return Err(GraphError::UnknownStep(from));
            }
            if transitions.contains_key(&from) {
                return Err(GraphError::DuplicateTransition(from));
            }

            let transition = match spec {
                EdgeSpec::Direct(target) => Transition::Direct(target),
                EdgeSpec::Route(route, path_map) => Transition::Route { route, path_map },
                EdgeSpec::Branches(pairs, otherwise) => {
                    let mut branches = Vec::with_capacity(pairs.len());
                    for (condition, target) in pairs {
                        let expr = condition::parse(&condition).map_err(|e| {
                            GraphError::InvalidCondition {
                                condition: condition.clone(),
                                message: e.to_string(),
                            }
                        })?;
                        branches.push(Branch {
                            condition,
                            expr,
                            target,
                        });
                    }
                    Transition::Branches {
                        branches,
                        otherwise,
                    }
                }
            };

            for target in transition.static_targets() {
                if target != END && !steps.contains_key(target) {
                    return Err(GraphError::UnknownStep(target.to_string()));
                }
            }
            transitions.insert(from, transition);
        }

        let covered: HashSet<&String> = transitions.keys().collect();
        if let Some(missing) = order.iter().find(|name| !covered.contains(name)) {
            return Err(GraphError::MissingTransition(missing.clone()));
        }

        Ok(Graph {
            entry,
            steps,
            order,
            transitions,
            interrupts,
            schema: self.schema.map(Arc::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::step::step_fn;
    use crate::engine::step::StepContext;
    use serde_json::json;

    fn noop() -> impl Step {
        step_fn(|state: WorkflowState, _ctx: StepContext| async move { Ok(state) })
    }

    #[test]
    fn test_build_linear_graph() {
        let graph = GraphBuilder::new()
            .step("a", noop())
            .step("b", noop())
            .entry("a")
            .edge("a", "b")
            .edge("b", END)
            .build()
            .unwrap();

        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.step_names(), &["a".to_string(), "b".to_string()]);
        let state = graph.initial_state("go");
        assert_eq!(graph.next_step("a", &state).unwrap(), "b");
        assert_eq!(graph.next_step("b", &state).unwrap(), END);
    }

    #[test]
    fn test_interaction_step_takes_config_name() {
        let graph = GraphBuilder::new()
            .interrupt(InterruptConfig::new("confirm", "ask_user"))
            .human_interaction_step("confirm")
            .entry("ask_user")
            .edge("ask_user", END)
            .build()
            .unwrap();

        assert!(graph.has_step("ask_user"));
        assert!(graph.interrupt("confirm").is_some());
    }

    #[test]
    fn test_validation_errors() {
        let err = GraphBuilder::new().step("a", noop()).build().err();
        assert_eq!(err, Some(GraphError::MissingEntry));

        let err = GraphBuilder::new()
            .step("a", noop())
            .entry("zzz")
            .edge("a", END)
            .build()
            .err();
        assert_eq!(err, Some(GraphError::UnknownStep("zzz".into())));

        let err = GraphBuilder::new()
            .step("a", noop())
            .step("a", noop())
            .entry("a")
            .build()
            .err();
        assert_eq!(err, Some(GraphError::DuplicateStep("a".into())));

        let err = GraphBuilder::new()
            .step("a", noop())
            .step("b", noop())
            .entry("a")
            .edge("a", "b")
            .build()
            .err();
        assert_eq!(err, Some(GraphError::MissingTransition("b".into())));

        let err = GraphBuilder::new()
            .step("a", noop())
            .entry("a")
            .edge("a", "nowhere")
            .build()
            .err();
        assert_eq!(err, Some(GraphError::UnknownStep("nowhere".into())));

        let err = GraphBuilder::new()
            .step("a", noop())
            .entry("a")
            .edge("a", END)
            .edge("a", END)
            .build()
            .err();
        assert_eq!(err, Some(GraphError::DuplicateTransition("a".into())));

        let err = GraphBuilder::new()
            .human_interaction_step("confirm")
            .entry("b")
            .build()
            .err();
        assert_eq!(err, Some(GraphError::UnknownInterrupt("confirm".into())));

        let err = GraphBuilder::new()
            .step("a", noop())
            .entry("a")
            .branches("a", [("score >>> 3", END)], None)
            .build()
            .err();
        assert!(matches!(err, Some(GraphError::InvalidCondition { .. })));
    }

    #[test]
    fn test_route_to_unknown_step_is_caught_at_runtime() {
        let graph = GraphBuilder::new()
            .step("a", noop())
            .entry("a")
            .route("a", |_| "ghost".to_string())
            .build()
            .unwrap();

        let state = graph.initial_state("go");
        assert_eq!(
            graph.next_step("a", &state).unwrap_err(),
            GraphError::UnknownRoute {
                from: "a".into(),
                target: "ghost".into()
            }
        );
    }

    #[test]
    fn test_schema_seeds_initial_state() {
        let schema: StateSchema = serde_yaml::from_str("max_pages: { type: number, default: 10 }").unwrap();
        let graph = GraphBuilder::new()
            .step("a", noop())
            .entry("a")
            .edge("a", END)
            .schema(schema)
            .build()
            .unwrap();

        let state = graph.initial_state("go");
        assert_eq!(state.get("max_pages"), Some(&json!(10)));
        assert_eq!(state.current_step, "a");
    }
}
