//! `scale` — multiplies a numeric value by a constant factor.
//!
//! Used almost exclusively as a chain step, where `value` is filled in by a
//! `@step.field` reference rather than a literal in the configuration.

use serde_json::json;

use niamoto_core::error::{ErrorContext, TransformError};

use crate::schema::{ParamField, ParamSchema, ParamType, ParamValues};
use crate::traits::{Inputs, Transformer};

pub struct Scale {
    schema: ParamSchema,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![
                ParamField::required("value", ParamType::Number),
                ParamField::optional("by", ParamType::Number, json!(1.0)),
            ]),
        }
    }
}

impl Transformer for Scale {
    fn id(&self) -> &str {
        "scale"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn transform(&self, _inputs: &Inputs, params: &ParamValues, group_key: &str) -> Result<serde_json::Value, TransformError> {
        let value = params.get_f64("value").ok_or_else(|| TransformError {
            message: "`value` parameter missing after validation".into(),
            context: ErrorContext::default().with_plugin("scale").with_group(group_key),
        })?;
        let by = params.get_f64("by").unwrap_or(1.0);
        Ok(json!({ "value": value * by }))
    }
}
