//! `chain` — an ordered sequence of transformer steps where later steps may
//! reference earlier steps' outputs via `@steps[N].field` (§4.3, §9).
//!
//! `chain` is not a `Transformer` impl stored in the [`PluginRegistry`]
//! alongside `mean`/`scale`/etc: it needs to call back into the registry to
//! resolve each step's plugin, which a trait object of its own capability
//! can't do without a self-reference. Instead the orchestrator calls
//! [`run_chain`] directly when a widget's declared plugin is `chain`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use niamoto_core::error::{ErrorContext, TransformError};

use crate::registry::PluginRegistry;
use crate::traits::Inputs;

#[derive(Debug, Clone)]
pub struct ChainStepSpec {
    pub plugin: String,
    pub params: HashMap<String, Value>,
}

static STEP_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@steps\[(\d+)\]\.(\w+)$").unwrap());

/// Runs every step in order, resolving `@steps[N].field` references against
/// already-produced step outputs, and returns the final step's payload.
/// Chains are not recursive: a reference may only point at a step with a
/// strictly smaller index than the current one.
pub fn run_chain(
    registry: &PluginRegistry,
    steps: &[ChainStepSpec],
    inputs: &Inputs,
    group_key: &str,
) -> Result<Value, TransformError> {
    let mut outputs: Vec<Value> = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let plugin = registry.transformer(&step.plugin).ok_or_else(|| TransformError {
            message: format!("chain step {index} references unknown plugin `{}`", step.plugin),
            context: ErrorContext::default().with_plugin("chain").with_group(group_key),
        })?;

        let mut resolved_raw = HashMap::new();
        for (key, value) in &step.params {
            resolved_raw.insert(key.clone(), resolve_reference(value, &outputs, index, group_key)?);
        }

        let params = plugin
            .param_schema()
            .validate(&step.plugin, &resolved_raw)
            .map_err(|e| TransformError {
                message: format!("chain step {index} ({}): {}", step.plugin, e),
                context: ErrorContext::default().with_plugin("chain").with_group(group_key),
            })?;

        let output = plugin.transform(inputs, &params, group_key)?;
        outputs.push(output);
    }

    Ok(outputs.into_iter().last().unwrap_or(Value::Null))
}

fn resolve_reference(
    value: &Value,
    outputs: &[Value],
    current_step: usize,
    group_key: &str,
) -> Result<Value, TransformError> {
    let Some(text) = value.as_str() else {
        return Ok(value.clone());
    };
    let Some(captures) = STEP_REF.captures(text) else {
        return Ok(value.clone());
    };

    let step_index: usize = captures[1].parse().unwrap_or(usize::MAX);
    let field = &captures[2];

    if step_index >= current_step {
        return Err(TransformError {
            message: format!("chain reference `{text}` points at a step that has not run yet"),
            context: ErrorContext::default().with_plugin("chain").with_group(group_key).with_field(text),
        });
    }

    outputs
        .get(step_index)
        .and_then(|output| output.get(field))
        .cloned()
        .ok_or_else(|| TransformError {
            message: format!("chain reference `{text}` could not be resolved"),
            context: ErrorContext::default().with_plugin("chain").with_group(group_key).with_field(text),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::mean::Mean;
    use crate::builtin::scale::Scale;
    use serde_json::json;
    use std::sync::Arc;

    fn row(dbh: f64) -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("dbh".into(), json!(dbh));
        m
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register_transformer(Arc::new(Mean::default())).unwrap();
        registry.register_transformer(Arc::new(Scale::default())).unwrap();
        registry
    }

    #[test]
    fn resolves_reference_to_prior_step_output() {
        let registry = registry();
        let mut inputs: Inputs = HashMap::new();
        inputs.insert("primary".into(), vec![row(10.0), row(20.0), row(30.0)]);

        let mut mean_params = HashMap::new();
        mean_params.insert("field".to_string(), json!("dbh"));

        let mut scale_params = HashMap::new();
        scale_params.insert("value".to_string(), json!("@steps[0].value"));
        scale_params.insert("by".to_string(), json!(100.0));

        let steps = vec![
            ChainStepSpec { plugin: "mean".into(), params: mean_params },
            ChainStepSpec { plugin: "scale".into(), params: scale_params },
        ];

        let result = run_chain(&registry, &steps, &inputs, "Eucalyptus|grandis").unwrap();
        assert_eq!(result, json!({ "value": 2000.0 }));
    }

    #[test]
    fn forward_reference_is_rejected() {
        let registry = registry();
        let inputs: Inputs = HashMap::new();

        let mut params = HashMap::new();
        params.insert("value".to_string(), json!("@steps[1].value"));

        let steps = vec![ChainStepSpec { plugin: "scale".into(), params }];
        assert!(run_chain(&registry, &steps, &inputs, "g").is_err());
    }

    #[test]
    fn unresolvable_field_reference_is_an_error() {
        let registry = registry();
        let mut inputs: Inputs = HashMap::new();
        inputs.insert("primary".into(), vec![row(10.0)]);

        let mut mean_params = HashMap::new();
        mean_params.insert("field".to_string(), json!("dbh"));

        let mut scale_params = HashMap::new();
        scale_params.insert("value".to_string(), json!("@steps[0].nonexistent"));

        let steps = vec![
            ChainStepSpec { plugin: "mean".into(), params: mean_params },
            ChainStepSpec { plugin: "scale".into(), params: scale_params },
        ];

        assert!(run_chain(&registry, &steps, &inputs, "g").is_err());
    }
}
