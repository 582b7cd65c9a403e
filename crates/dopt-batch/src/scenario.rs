use anyhow::{Context, Result};
use dopt_core::DispatchConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One variant of a base configuration.
///
/// `overrides` is merged into the base as JSON: objects merge key by key,
/// everything else (arrays included) replaces the base value, and `null`
/// removes the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub overrides: Value,
}

impl Scenario {
    pub fn new(id: &str, overrides: Value) -> Self {
        Self {
            id: id.to_string(),
            overrides,
        }
    }

    /// The base configuration with this scenario's overrides applied.
    pub fn apply(&self, base: &DispatchConfig) -> Result<DispatchConfig> {
        let mut value = serde_json::to_value(base).context("serializing base configuration")?;
        merge_overrides(&mut value, &self.overrides);
        serde_json::from_value(value)
            .with_context(|| format!("applying overrides of scenario '{}'", self.id))
    }
}

pub fn merge_overrides(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge_overrides(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (_, Value::Null) => {}
        (target, value) => *target = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objects_merge_and_arrays_replace() {
        let mut base = json!({
            "site": { "customer": "Commercial", "import_max": 100.0 },
            "batteries": [{ "name": "b1" }, { "name": "b2" }]
        });
        merge_overrides(
            &mut base,
            &json!({
                "site": { "import_max": 50.0, "input_timezone": null },
                "batteries": [{ "name": "b3" }]
            }),
        );
        assert_eq!(base["site"]["customer"], "Commercial");
        assert_eq!(base["site"]["import_max"], 50.0);
        assert_eq!(base["batteries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_null_removes_key() {
        let mut base = json!({ "network": { "nodes": [] }, "system": { "pv": true } });
        merge_overrides(&mut base, &json!({ "network": null }));
        assert!(base.get("network").is_none());
        assert_eq!(base["system"]["pv"], true);
    }

    #[test]
    fn test_scenario_apply_overrides_tariff() {
        let base: DispatchConfig = serde_json::from_value(json!({
            "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } }
        }))
        .unwrap();
        let scenario = Scenario::new("expensive", json!({ "tariff": { "energy": { "0": 0.30 } } }));
        let config = scenario.apply(&base).unwrap();
        assert_eq!(config.tariff.energy.get(&0), Some(&0.30));
        assert_eq!(config.tariff.demand.get(&0), Some(&0.0));
    }
}
