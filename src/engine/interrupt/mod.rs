// SPDX-License-Identifier: MIT

//! Human-in-the-loop interrupts
//!
//! A step that needs an answer calls [`StepContext::suspend`]. On the first
//! pass the call returns `Err(StepError::Suspended)` and the engine persists
//! the pending [`Interrupt`]. When the thread is resumed, the engine
//! re-executes the *whole* step from its beginning, and this time `suspend`
//! returns the caller's raw answer. Work done before the suspend point is
//! therefore repeated on every resume and must be idempotent or cheap.
//!
//! [`HumanInteractionNode`] packages the common pattern: prompt with the
//! static fields of an [`InterruptConfig`], validate the answer, merge it
//! into state, and re-prompt on rejection without advancing the step.
//!
//! [`StepContext::suspend`]: crate::engine::step::StepContext::suspend

mod config;
mod node;

pub use config::{apply_values, InterruptConfig, StateMerge, Validator};
pub use node::{HumanInteractionNode, InteractionHooks, NoHooks, DEFAULT_INVALID_MESSAGE};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A pending request for human input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub message: String,
    pub data: InterruptData,
}

impl Interrupt {
    pub fn new(message: impl Into<String>, data: InterruptData) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

fn default_kind() -> String {
    "generic".to_string()
}

fn default_instructions() -> String {
    "Please provide input".to_string()
}

/// Structured payload shown to the human alongside the message.
///
/// `options` are presentation hints only; the validator decides what is
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptData {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for InterruptData {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            instructions: default_instructions(),
            options: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl InterruptData {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Set a field. `type`, `instructions` and `options` land on the typed
    /// fields and are ignored when the value has the wrong shape; any other
    /// key is extra.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match (key.as_str(), value) {
            ("type", Value::String(kind)) => self.kind = kind,
            ("instructions", Value::String(text)) => self.instructions = text,
            ("options", Value::Array(items)) if items.iter().all(Value::is_string) => {
                self.options = items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
            ("type" | "instructions" | "options", value) => {
                log::warn!("Ignoring interrupt field '{}' with unexpected value {}", key, value);
            }
            (_, value) => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Look up a field by its serialized name
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "type" => Some(Value::String(self.kind.clone())),
            "instructions" => Some(Value::String(self.instructions.clone())),
            "options" => Some(Value::from(self.options.clone())),
            _ => self.extra.get(key).cloned(),
        }
    }
}

/// Outcome of validating a raw answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Values the merge function folds into state
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Validation {
    pub fn accept() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn accept_with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::accept().with(key, value)
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_message: Some(message.into()),
            values: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }
}
