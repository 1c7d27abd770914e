//! `top_ranking` — ranks distinct values of a categorical field by
//! occurrence count across a group's rows and keeps the top N.

use std::collections::HashMap;

use serde_json::json;

use niamoto_core::error::{ErrorContext, TransformError};

use crate::schema::{ParamField, ParamSchema, ParamType, ParamValues};
use crate::traits::{Inputs, Transformer};

pub struct TopRanking {
    schema: ParamSchema,
}

impl Default for TopRanking {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![
                ParamField::required("field", ParamType::String),
                ParamField::optional("source", ParamType::String, json!("primary")),
                ParamField::optional("limit", ParamType::Number, json!(10.0)),
            ]),
        }
    }
}

impl Transformer for TopRanking {
    fn id(&self) -> &str {
        "top_ranking"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn transform(&self, inputs: &Inputs, params: &ParamValues, group_key: &str) -> Result<serde_json::Value, TransformError> {
        let field = params.get_str("field").ok_or_else(|| TransformError {
            message: "`field` parameter missing after validation".into(),
            context: ErrorContext::default().with_plugin("top_ranking").with_group(group_key),
        })?;
        let source = params.get_str("source").unwrap_or("primary");
        let limit = params.get_u64("limit").unwrap_or(10) as usize;
        let rows = inputs.get(source).map(Vec::as_slice).unwrap_or(&[]);

        if !rows.is_empty() && rows.iter().all(|r| !r.contains_key(field)) {
            return Err(TransformError {
                message: format!("none of the rows in source `{source}` carry field `{field}`"),
                context: ErrorContext::default()
                    .with_plugin("top_ranking")
                    .with_group(group_key)
                    .with_field(field),
            });
        }

        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in rows {
            if let Some(value) = row.get(field).and_then(|v| v.as_str()) {
                *counts.entry(value.to_string()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        let ranking = ranked
            .into_iter()
            .map(|(key, count)| json!({ "key": key, "count": count }))
            .collect::<Vec<_>>();
        Ok(json!({ "ranking": ranking }))
    }
}
