// SPDX-License-Identifier: MIT

//! State schema definitions
//!
//! A schema is optional. It declares types, reducers and defaults for the
//! open fields a workflow carries alongside the required ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema describing a workflow's open state fields
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: BTreeMap<String, StateFieldDef>,
}

impl StateSchema {
    /// Declare a field, builder style
    pub fn field(mut self, name: impl Into<String>, def: StateFieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Reducer for a field; undeclared fields overwrite
    pub fn reducer(&self, name: &str) -> ReducerType {
        self.fields
            .get(name)
            .map(|def| def.reducer.clone())
            .unwrap_or_default()
    }

    /// Check a value against the declared type of a field.
    /// Undeclared fields and `null` always pass.
    pub fn check(&self, name: &str, value: &Value) -> Result<(), String> {
        let Some(def) = self.fields.get(name) else {
            return Ok(());
        };
        if value.is_null() || def.field_type.matches(value) {
            return Ok(());
        }
        // Append accepts single elements as well as arrays
        if def.reducer == ReducerType::Append {
            return Ok(());
        }
        Err(format!("expected {}, got {}", def.field_type, value))
    }
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    pub default: Option<Value>,
}

impl StateFieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            reducer: ReducerType::Overwrite,
            default: None,
        }
    }

    pub fn with_reducer(mut self, reducer: ReducerType) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}
