use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Acumulador de resultados: clave de la transformación -> valor plegado.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SideEffects {
    values: BTreeMap<String, Value>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_reemplaza_el_valor_anterior() {
        let mut se = SideEffects::new();
        se.set("count", json!(1));
        se.set("count", json!(2));

        assert_eq!(se.get("count"), Some(&json!(2)));
        assert_eq!(se.keys().collect::<Vec<_>>(), vec!["count"]);
        assert_eq!(serde_json::to_value(&se).unwrap(), json!({"count": 2}));
    }
}
