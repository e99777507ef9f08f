use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Nombre del envoltorio uniforme con el que viajan los registros entre etapas.
pub const KV_ENVELOPE: &str = "kv-json";

/// Par clave/valor opaco. En disco es una línea `{"k": ..., "v": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvPair {
    #[serde(rename = "k")]
    pub key: Value,
    #[serde(rename = "v")]
    pub value: Value,
}

impl KvPair {
    pub fn new(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn into_tuple(self) -> (Value, Value) {
        (self.key, self.value)
    }
}

impl From<(Value, Value)> for KvPair {
    fn from((key, value): (Value, Value)) -> Self {
        Self { key, value }
    }
}
