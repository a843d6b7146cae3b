// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::{InterruptData, Validation};
use crate::engine::error::{StateError, StepError};
use crate::engine::state::{WorkflowState, WorkflowStatus};

/// Decides whether a raw answer is acceptable: `(raw_input, context)`
pub type Validator = Arc<dyn Fn(&str, &Map<String, Value>) -> Validation + Send + Sync>;

/// Folds an accepted answer into state
pub type StateMerge =
    Arc<dyn Fn(WorkflowState, &Validation) -> Result<WorkflowState, StepError> + Send + Sync>;

/// Static description of one kind of human interaction.
///
/// One config exists per interrupt type per workflow definition; it is
/// shared by every run and never mutated after registration.
#[derive(Clone)]
pub struct InterruptConfig {
    pub kind: String,
    pub message: String,
    pub instructions: String,
    pub options: Vec<String>,
    /// Name of the graph node that hosts this interaction
    pub step_name: String,
    validator: Validator,
    merge: StateMerge,
}

impl InterruptConfig {
    /// A config that accepts any answer and stores it under `response`
    pub fn new(kind: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: "Input required".to_string(),
            instructions: "Please provide input".to_string(),
            options: Vec::new(),
            step_name: step_name.into(),
            validator: Arc::new(|raw: &str, _: &Map<String, Value>| {
                Validation::accept_with("response", raw)
            }),
            merge: Arc::new(apply_values),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> Validation + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    pub fn merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(WorkflowState, &Validation) -> Result<WorkflowState, StepError>
            + Send
            + Sync
            + 'static,
    {
        self.merge = Arc::new(merge);
        self
    }

    /// Base interrupt payload built from the static fields
    pub fn interrupt_data(&self) -> InterruptData {
        InterruptData::new(self.kind.clone())
            .with_instructions(self.instructions.clone())
            .with_options(self.options.clone())
    }

    pub fn validate(&self, raw: &str, context: &Map<String, Value>) -> Validation {
        (self.validator)(raw, context)
    }

    pub fn apply(&self, state: WorkflowState, validation: &Validation) -> Result<WorkflowState, StepError> {
        (self.merge)(state, validation)
    }
}

impl fmt::Debug for InterruptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptConfig")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("instructions", &self.instructions)
            .field("options", &self.options)
            .field("step_name", &self.step_name)
            .finish_non_exhaustive()
    }
}

/// Default merge: write every validated value into state.
///
/// `status` and `error` are mapped onto the typed fields, so a choice such
/// as `{confirmed: false, status: cancelled}` ends the run.
pub fn apply_values(
    mut state: WorkflowState,
    validation: &Validation,
) -> Result<WorkflowState, StepError> {
    for (key, value) in &validation.values {
        match key.as_str() {
            "status" => {
                let status = value
                    .as_str()
                    .ok_or_else(|| StateError::InvalidField {
                        field: "status".to_string(),
                        message: format!("expected string, got {}", value),
                    })?
                    .parse::<WorkflowStatus>()?;
                state.status = status;
            }
            "error" => {
                state.error = value.as_str().map(str::to_string);
            }
            _ => state.update(key, value.clone())?,
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_accepts_anything() {
        let config = InterruptConfig::new("notes", "collect_notes");
        let validation = config.validate("anything at all", &Map::new());
        assert!(validation.valid);
        assert_eq!(validation.get_str("response"), Some("anything at all"));

        let state = config
            .apply(WorkflowState::new("go", "collect_notes"), &validation)
            .unwrap();
        assert_eq!(state.get_str("response"), Some("anything at all"));
    }

    #[test]
    fn test_interrupt_data_from_config() {
        let config = InterruptConfig::new("confirm", "b")
            .message("Proceed?")
            .instructions("Answer yes or no")
            .options(["yes", "no"]);

        let data = config.interrupt_data();
        assert_eq!(data.kind, "confirm");
        assert_eq!(data.instructions, "Answer yes or no");
        assert_eq!(data.options, vec!["yes", "no"]);
        assert!(data.extra.is_empty());
    }

    #[test]
    fn test_apply_values_maps_reserved_fields() {
        let validation = Validation::accept()
            .with("confirmed", false)
            .with("status", "cancelled")
            .with("error", "Login cancelled by user");

        let state = apply_values(WorkflowState::new("go", "b"), &validation).unwrap();
        assert_eq!(state.status, WorkflowStatus::Cancelled);
        assert_eq!(state.error.as_deref(), Some("Login cancelled by user"));
        assert_eq!(state.get("confirmed"), Some(&json!(false)));
    }

    #[test]
    fn test_apply_values_rejects_unknown_status() {
        let validation = Validation::accept().with("status", "paused");
        let err = apply_values(WorkflowState::new("go", "b"), &validation).unwrap_err();
        assert!(matches!(err, StepError::State(StateError::InvalidField { .. })));
    }
}
