// SPDX-License-Identifier: MIT

//! Step registry - maps `uses:` kinds to step factories

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::state::RESERVED_FIELDS;
use crate::engine::{Step, StepContext, StepError, WorkflowState};
use crate::waypoint::error::WorkflowError;

/// Builds a step from its id and `with:` parameters
pub type StepFactory =
    Arc<dyn Fn(&str, &Map<String, Value>) -> Result<Arc<dyn Step>, WorkflowError> + Send + Sync>;

#[derive(Clone)]
pub struct StepRegistry {
    factories: Arc<RwLock<HashMap<String, StepFactory>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry preloaded with `set`, `log`, `fail` and `wait`
    pub async fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("set", Arc::new(SetStep::from_params)).await;
        registry.register("log", Arc::new(LogStep::from_params)).await;
        registry.register("fail", Arc::new(FailStep::from_params)).await;
        registry.register("wait", Arc::new(WaitStep::from_params)).await;
        registry
    }

    pub async fn register(&self, kind: impl Into<String>, factory: StepFactory) {
        let mut factories = self.factories.write().await;
        factories.insert(kind.into(), factory);
    }

    pub async fn get(&self, kind: &str) -> Option<StepFactory> {
        let factories = self.factories.read().await;
        factories.get(kind).cloned()
    }

    pub async fn kinds(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut kinds: Vec<String> = factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Instantiate the step kind `kind` for step `step_id`
    pub async fn create(
        &self,
        step_id: &str,
        kind: &str,
        params: &Map<String, Value>,
    ) -> Result<Arc<dyn Step>, WorkflowError> {
        let factory = self
            .get(kind)
            .await
            .ok_or_else(|| WorkflowError::UnknownStepKind {
                step: step_id.to_string(),
                kind: kind.to_string(),
            })?;
        factory(step_id, params)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(step: &str, message: impl Into<String>) -> WorkflowError {
    WorkflowError::InvalidParams {
        step: step.to_string(),
        message: message.into(),
    }
}

/// `set`: write every `with:` entry into state
struct SetStep {
    values: Map<String, Value>,
}

impl SetStep {
    fn from_params(step: &str, params: &Map<String, Value>) -> Result<Arc<dyn Step>, WorkflowError> {
        if let Some(key) = params.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(invalid(step, format!("'{}' is a reserved state field", key)));
        }
        Ok(Arc::new(Self {
            values: params.clone(),
        }))
    }
}

#[async_trait]
impl Step for SetStep {
    async fn run(&self, mut state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
        for (key, value) in &self.values {
            state.update(key, value.clone())?;
        }
        Ok(state)
    }
}

/// `log`: emit `message` at info level
struct LogStep {
    message: String,
}

impl LogStep {
    fn from_params(step: &str, params: &Map<String, Value>) -> Result<Arc<dyn Step>, WorkflowError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(step, "'message' must be a string"))?;
        Ok(Arc::new(Self {
            message: message.to_string(),
        }))
    }
}

#[async_trait]
impl Step for LogStep {
    async fn run(&self, state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
        log::info!("[{}:{}] {}", ctx.thread_id(), ctx.step_name(), self.message);
        Ok(state)
    }
}

/// `fail`: end the run with `message` as the error
struct FailStep {
    message: String,
}

impl FailStep {
    fn from_params(_step: &str, params: &Map<String, Value>) -> Result<Arc<dyn Step>, WorkflowError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("step failed");
        Ok(Arc::new(Self {
            message: message.to_string(),
        }))
    }
}

#[async_trait]
impl Step for FailStep {
    async fn run(&self, _state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
        Err(StepError::failed(self.message.clone()))
    }
}

/// `wait`: sleep `secs`, ending early on cancellation
struct WaitStep {
    duration: Duration,
}

impl WaitStep {
    fn from_params(step: &str, params: &Map<String, Value>) -> Result<Arc<dyn Step>, WorkflowError> {
        let secs = params
            .get("secs")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .ok_or_else(|| invalid(step, "'secs' must be a non-negative number"))?;
        Ok(Arc::new(Self {
            duration: Duration::from_secs_f64(secs),
        }))
    }
}

#[async_trait]
impl Step for WaitStep {
    async fn run(&self, state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
        ctx.cancel_token().sleep(self.duration).await?;
        Ok(state)
    }
}
