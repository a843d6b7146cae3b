// SPDX-License-Identifier: MIT

//! Runtime state carried through a workflow run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::schema::{ReducerType, StateSchema};
use crate::engine::error::StateError;

/// Names owned by the engine; not writable through [`WorkflowState::update`]
pub const RESERVED_FIELDS: [&str; 5] = ["version", "input", "current_step", "status", "error"];

/// Lifecycle of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Running,
    AwaitingInput,
    Completed,
    Error,
    Cancelled,
}

impl WorkflowStatus {
    /// Completed, errored and cancelled runs are never mutated again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Error | WorkflowStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::AwaitingInput => "awaiting_input",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Error => "error",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(WorkflowStatus::Running),
            "awaiting_input" => Ok(WorkflowStatus::AwaitingInput),
            "completed" => Ok(WorkflowStatus::Completed),
            "error" => Ok(WorkflowStatus::Error),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(StateError::InvalidField {
                field: "status".to_string(),
                message: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// Versioned, open key-value record with four required fields.
///
/// Open fields are kept in key order so a serialized snapshot is
/// deterministic. Reducers come from the workflow's [`StateSchema`]; the
/// schema is not part of the snapshot and does not affect equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Incremented on every checkpoint save
    #[serde(default)]
    pub version: u64,
    /// The initial payload of the run
    pub input: String,
    /// Step being executed, or awaiting resumption
    pub current_step: String,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
    #[serde(skip)]
    schema: Option<Arc<StateSchema>>,
}

impl WorkflowState {
    /// Fresh state positioned at `entry`
    pub fn new(input: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            version: 0,
            input: input.into(),
            current_step: entry.into(),
            status: WorkflowStatus::Running,
            error: None,
            fields: Map::new(),
            schema: None,
        }
    }

    /// Attach a schema and seed declared defaults for absent fields
    pub fn with_schema(mut self, schema: Arc<StateSchema>) -> Self {
        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                if !self.fields.contains_key(name) {
                    self.fields.insert(name.clone(), default.clone());
                }
            }
        }
        self.schema = Some(schema);
        self
    }

    /// Re-attach reducers after a snapshot was loaded
    pub fn attach_schema(&mut self, schema: Arc<StateSchema>) {
        self.schema = Some(schema);
    }

    /// Write an open field through its reducer
    pub fn update(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        if RESERVED_FIELDS.contains(&key) {
            return Err(StateError::ReservedField(key.to_string()));
        }

        let reducer = match &self.schema {
            Some(schema) => {
                schema
                    .check(key, &value)
                    .map_err(|message| StateError::InvalidField {
                        field: key.to_string(),
                        message,
                    })?;
                schema.reducer(key)
            }
            None => ReducerType::Overwrite,
        };

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let entry = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if entry.is_null() {
                    *entry = Value::Array(vec![]);
                }
                if let Value::Array(items) = entry {
                    match value {
                        Value::Array(new_items) => items.extend(new_items),
                        other => items.push(other),
                    }
                }
            }
            ReducerType::Max | ReducerType::Min => {
                let keep_new = match (self.fields.get(key).and_then(Value::as_f64), value.as_f64()) {
                    (_, None) => false,
                    (None, Some(_)) => true,
                    (Some(current), Some(new)) if reducer == ReducerType::Max => new > current,
                    (Some(current), Some(new)) => new < current,
                };
                if keep_new {
                    self.fields.insert(key.to_string(), value);
                }
            }
            ReducerType::Merge => {
                let entry = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (entry, value) {
                    (Value::Object(current), Value::Object(new)) => current.extend(new),
                    (slot, other) => *slot = other,
                }
            }
        }
        Ok(())
    }

    /// Get an open field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Look up a dot-notation path; the first segment may name a required
    /// field (`status`, `current_step`, ...) as well as an open one
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let head = parts.next()?;
        let root = match head {
            "version" => Value::from(self.version),
            "input" => Value::String(self.input.clone()),
            "current_step" => Value::String(self.current_step.clone()),
            "status" => Value::String(self.status.as_str().to_string()),
            "error" => self.error.clone().map(Value::String).unwrap_or(Value::Null),
            _ => self.fields.get(head)?.clone(),
        };

        let mut current = &root;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Open fields only
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mark the run failed with a message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = WorkflowStatus::Error;
        self.error = Some(message.into());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Flat JSON object: required fields followed by open fields
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("version".to_string(), Value::from(self.version));
        obj.insert("input".to_string(), Value::String(self.input.clone()));
        obj.insert(
            "current_step".to_string(),
            Value::String(self.current_step.clone()),
        );
        obj.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        if let Some(error) = &self.error {
            obj.insert("error".to_string(), Value::String(error.clone()));
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }

    /// Decode a snapshot, checking the required fields first so a bad
    /// snapshot names the offending field
    pub fn from_json(value: Value) -> Result<Self, StateError> {
        let Value::Object(mut obj) = value else {
            return Err(StateError::InvalidField {
                field: "state".to_string(),
                message: "expected a JSON object".to_string(),
            });
        };

        let mut take_string = |name: &str| -> Result<String, StateError> {
            match obj.remove(name) {
                Some(Value::String(s)) => Ok(s),
                Some(other) => Err(StateError::InvalidField {
                    field: name.to_string(),
                    message: format!("expected string, got {}", other),
                }),
                None => Err(StateError::MissingField(name.to_string())),
            }
        };

        let input = take_string("input")?;
        let current_step = take_string("current_step")?;
        let status = take_string("status")?.parse::<WorkflowStatus>()?;

        let version = match obj.remove("version") {
            None => 0,
            Some(v) => v.as_u64().ok_or_else(|| StateError::InvalidField {
                field: "version".to_string(),
                message: format!("expected unsigned integer, got {}", v),
            })?,
        };
        let error = match obj.remove("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(StateError::InvalidField {
                    field: "error".to_string(),
                    message: format!("expected string, got {}", other),
                })
            }
        };

        Ok(Self {
            version,
            input,
            current_step,
            status,
            error,
            fields: obj,
            schema: None,
        })
    }
}

impl PartialEq for WorkflowState {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.input == other.input
            && self.current_step == other.current_step
            && self.status == other.status
            && self.error == other.error
            && self.fields == other.fields
    }
}
