// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{Interrupt, InterruptConfig, InterruptData};
use crate::engine::error::StepError;
use crate::engine::state::WorkflowState;
use crate::engine::step::{Step, StepContext};

/// Re-prompt message when a validator rejects without saying why
pub const DEFAULT_INVALID_MESSAGE: &str = "Invalid input. Please try again.";

/// Per-workflow customization points of a [`HumanInteractionNode`].
///
/// Every method has a no-op default.
pub trait InteractionHooks: Send + Sync {
    /// Return a state to end the interaction early without prompting
    fn validate_preconditions(
        &self,
        _state: &WorkflowState,
        _config: &InterruptConfig,
    ) -> Option<WorkflowState> {
        None
    }

    /// Extra fields merged over the config's static interrupt data
    fn custom_data(&self, _state: &WorkflowState, _config: &InterruptConfig) -> Map<String, Value> {
        Map::new()
    }

    /// Context handed to the validator alongside the raw answer
    fn validation_context(
        &self,
        _state: &WorkflowState,
        _config: &InterruptConfig,
    ) -> Map<String, Value> {
        Map::new()
    }
}

/// Hooks that do nothing
pub struct NoHooks;

impl InteractionHooks for NoHooks {}

/// Step that asks a human a question described by an [`InterruptConfig`]
pub struct HumanInteractionNode {
    config: Arc<InterruptConfig>,
    hooks: Arc<dyn InteractionHooks>,
}

impl HumanInteractionNode {
    pub fn new(config: Arc<InterruptConfig>) -> Self {
        Self {
            config,
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_hooks(config: Arc<InterruptConfig>, hooks: Arc<dyn InteractionHooks>) -> Self {
        Self { config, hooks }
    }

    pub fn config(&self) -> &InterruptConfig {
        &self.config
    }

    fn build_data(&self, state: &WorkflowState) -> InterruptData {
        let mut data = self.config.interrupt_data();
        for (key, value) in self.hooks.custom_data(state, &self.config) {
            data.set(key, value);
        }
        data
    }
}

#[async_trait]
impl Step for HumanInteractionNode {
    async fn run(&self, mut state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
        let config = &self.config;
        state.current_step = config.step_name.clone();

        if let Some(early) = self.hooks.validate_preconditions(&state, config) {
            log::info!(
                "[{}] {}: precondition ended interaction with status {}",
                ctx.thread_id(),
                config.step_name,
                early.status
            );
            return Ok(early);
        }

        let data = self.build_data(&state);
        // Rebuilt from the state loaded at this resume, not the first prompt
        let context = self.hooks.validation_context(&state, config);

        let raw = ctx.suspend(config.message.clone(), data.clone())?;
        let validation = config.validate(&raw, &context);

        if validation.valid {
            log::debug!(
                "[{}] {}: accepted answer {:?}",
                ctx.thread_id(),
                config.step_name,
                raw
            );
            return config.apply(state, &validation);
        }

        let error_message = validation
            .error_message
            .unwrap_or_else(|| DEFAULT_INVALID_MESSAGE.to_string());
        log::info!(
            "[{}] {}: rejected answer {:?}: {}",
            ctx.thread_id(),
            config.step_name,
            raw,
            error_message
        );

        let guidance = data
            .with("error", true)
            .with("error_message", error_message.clone())
            .with("previous_input", raw);
        Err(StepError::suspended(Interrupt::new(error_message, guidance)))
    }
}
