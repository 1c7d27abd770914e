//! In-memory store of widget outputs produced by a transform pass (§4.5).
//!
//! Keyed by the grouped entity's name (the `data` source that defined the
//! groups for a transform section) rather than by `group_by` column name,
//! since a given grouped entity's payloads are what an export target's
//! `GroupDescriptor` actually names.

use dashmap::DashMap;

use niamoto_core::payload::WidgetPayload;

#[derive(Default)]
pub struct PayloadStore {
    inner: DashMap<String, Vec<WidgetPayload>>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, grouped_entity: &str, payload: WidgetPayload) {
        self.inner.entry(grouped_entity.to_string()).or_default().push(payload);
    }

    /// Payloads for a grouped entity, restricted to the named widgets if
    /// given, sorted by `(group_key, widget_id)` for deterministic export
    /// output regardless of the transform pool's completion order.
    pub fn get(&self, grouped_entity: &str, widgets: Option<&[String]>) -> Vec<WidgetPayload> {
        let mut payloads = self
            .inner
            .get(grouped_entity)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        if let Some(widgets) = widgets {
            payloads.retain(|p| widgets.iter().any(|w| w == &p.widget_id));
        }
        payloads.sort_by(|a, b| (a.group_key.as_str(), a.widget_id.as_str()).cmp(&(b.group_key.as_str(), b.widget_id.as_str())));
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_filters_and_sorts_deterministically() {
        let store = PayloadStore::new();
        store.insert("taxonomy", WidgetPayload::new("B", "mean", json!(1)));
        store.insert("taxonomy", WidgetPayload::new("A", "mean", json!(2)));
        store.insert("taxonomy", WidgetPayload::new("A", "top_ranking", json!(3)));

        let all = store.get("taxonomy", None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].group_key, "A");
        assert_eq!(all[0].widget_id, "mean");

        let filtered = store.get("taxonomy", Some(&["mean".to_string()]));
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|p| p.widget_id == "mean"));
    }

    #[test]
    fn unknown_entity_returns_empty() {
        let store = PayloadStore::new();
        assert!(store.get("missing", None).is_empty());
    }
}
