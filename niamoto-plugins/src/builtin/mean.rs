//! `mean` — arithmetic mean of a numeric field across an input source's rows.

use serde_json::json;

use niamoto_core::error::{ErrorContext, TransformError};

use crate::schema::{ParamField, ParamSchema, ParamType, ParamValues};
use crate::traits::{Inputs, Transformer};

pub struct Mean {
    schema: ParamSchema,
}

impl Default for Mean {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![
                ParamField::required("field", ParamType::String),
                ParamField::optional("source", ParamType::String, json!("primary")),
            ]),
        }
    }
}

impl Transformer for Mean {
    fn id(&self) -> &str {
        "mean"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn transform(&self, inputs: &Inputs, params: &ParamValues, group_key: &str) -> Result<serde_json::Value, TransformError> {
        let field = params.get_str("field").ok_or_else(|| TransformError {
            message: "`field` parameter missing after validation".into(),
            context: ErrorContext::default().with_plugin("mean").with_group(group_key),
        })?;
        let source = params.get_str("source").unwrap_or("primary");
        let rows = inputs.get(source).map(Vec::as_slice).unwrap_or(&[]);

        let values: Vec<f64> = rows.iter().filter_map(|row| row.get(field)).filter_map(|v| v.as_f64()).collect();

        if values.is_empty() {
            return Ok(json!({ "value": null }));
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(json!({ "value": mean }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(dbh: f64) -> serde_json::Map<String, serde_json::Value> {
        let mut m = serde_json::Map::new();
        m.insert("dbh".into(), json!(dbh));
        m
    }

    #[test]
    fn computes_mean_of_declared_field() {
        let plugin = Mean::default();
        let mut inputs: Inputs = HashMap::new();
        inputs.insert("primary".into(), vec![row(10.0), row(20.0), row(30.0)]);

        let mut raw = HashMap::new();
        raw.insert("field".to_string(), json!("dbh"));
        let params = plugin.param_schema().validate("mean", &raw).unwrap();

        let result = plugin.transform(&inputs, &params, "Eucalyptus|grandis").unwrap();
        assert_eq!(result, json!({ "value": 20.0 }));
    }

    #[test]
    fn empty_source_yields_null_value() {
        let plugin = Mean::default();
        let inputs: Inputs = HashMap::new();
        let mut raw = HashMap::new();
        raw.insert("field".to_string(), json!("dbh"));
        let params = plugin.param_schema().validate("mean", &raw).unwrap();

        let result = plugin.transform(&inputs, &params, "g").unwrap();
        assert_eq!(result, json!({ "value": null }));
    }
}
