//! Declared parameter schemas (§4.3).
//!
//! Every plugin declares named parameters with types, defaults, and a
//! required/optional flag. Validation happens once, at configuration-load
//! time, not on every invocation — the orchestrator calls
//! [`ParamSchema::validate`] while building the transform/export plan and
//! carries the already-validated [`ParamValues`] into every call after that.

use std::collections::HashMap;

use serde_json::Value;

use niamoto_core::error::{ConfigError, ErrorContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Bool,
    List,
    Object,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Bool => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamField {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamField {
    pub fn required(name: &'static str, param_type: ParamType) -> Self {
        Self { name, param_type, required: true, default: None }
    }

    pub fn optional(name: &'static str, param_type: ParamType, default: Value) -> Self {
        Self { name, param_type, required: false, default: Some(default) }
    }
}

/// A plugin's declared parameter contract.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    pub fields: Vec<ParamField>,
}

impl ParamSchema {
    pub fn new(fields: Vec<ParamField>) -> Self {
        Self { fields }
    }

    /// Validates raw config-supplied params against this schema, filling in
    /// declared defaults for absent optional fields. Unknown keys are
    /// rejected, matching the configuration document's `deny_unknown_fields`
    /// posture (§10.5).
    pub fn validate(&self, plugin_id: &str, raw: &HashMap<String, Value>) -> Result<ParamValues, ConfigError> {
        let mut resolved = HashMap::new();
        let known: std::collections::HashSet<&str> = self.fields.iter().map(|f| f.name).collect();

        for key in raw.keys() {
            if !known.contains(key.as_str()) {
                return Err(ConfigError {
                    message: format!("unknown parameter `{key}` for plugin `{plugin_id}`"),
                    context: ErrorContext::default().with_plugin(plugin_id).with_field(key),
                });
            }
        }

        for field in &self.fields {
            match raw.get(field.name) {
                Some(value) => {
                    if !field.param_type.matches(value) {
                        return Err(ConfigError {
                            message: format!(
                                "parameter `{}` for plugin `{}` has the wrong type",
                                field.name, plugin_id
                            ),
                            context: ErrorContext::default().with_plugin(plugin_id).with_field(field.name),
                        });
                    }
                    resolved.insert(field.name.to_string(), value.clone());
                }
                None if field.required => {
                    return Err(ConfigError {
                        message: format!(
                            "missing required parameter `{}` for plugin `{}`",
                            field.name, plugin_id
                        ),
                        context: ErrorContext::default().with_plugin(plugin_id).with_field(field.name),
                    });
                }
                None => {
                    if let Some(default) = &field.default {
                        resolved.insert(field.name.to_string(), default.clone());
                    }
                }
            }
        }

        Ok(ParamValues(resolved))
    }
}

/// A validated, defaults-filled parameter bag handed to every plugin call.
#[derive(Debug, Clone, Default)]
pub struct ParamValues(HashMap<String, Value>);

impl ParamValues {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|v| v.as_u64())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }
}
