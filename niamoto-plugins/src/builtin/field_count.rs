//! `field_count` — counts the rows of a named input source for a group.

use serde_json::json;

use niamoto_core::error::TransformError;

use crate::schema::{ParamField, ParamSchema, ParamType};
use crate::traits::{Inputs, Transformer};

pub struct FieldCount {
    schema: ParamSchema,
}

impl Default for FieldCount {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![ParamField::optional(
                "source",
                ParamType::String,
                json!("primary"),
            )]),
        }
    }
}

impl Transformer for FieldCount {
    fn id(&self) -> &str {
        "field_count"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn transform(
        &self,
        inputs: &Inputs,
        params: &crate::schema::ParamValues,
        _group_key: &str,
    ) -> Result<serde_json::Value, TransformError> {
        let source = params.get_str("source").unwrap_or("primary");
        let count = inputs.get(source).map(|rows| rows.len()).unwrap_or(0);
        Ok(json!({ "count": count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamValues;
    use std::collections::HashMap;

    #[test]
    fn counts_rows_of_declared_source() {
        let plugin = FieldCount::default();
        let mut inputs: Inputs = HashMap::new();
        inputs.insert("primary".into(), vec![serde_json::Map::new(), serde_json::Map::new()]);

        let params = plugin.param_schema().validate("field_count", &HashMap::new()).unwrap();
        let result = plugin.transform(&inputs, &params, "Eucalyptus|grandis").unwrap();
        assert_eq!(result, json!({ "count": 2 }));
        let _: &ParamValues = &params;
    }

    #[test]
    fn missing_source_counts_as_zero() {
        let plugin = FieldCount::default();
        let inputs: Inputs = HashMap::new();
        let params = plugin.param_schema().validate("field_count", &HashMap::new()).unwrap();
        let result = plugin.transform(&inputs, &params, "g").unwrap();
        assert_eq!(result, json!({ "count": 0 }));
    }
}
