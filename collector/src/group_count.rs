use anyhow::Context;
use serde_json::{json, Map, Value};

use common::{JobConfig, KvPair, StageSet};

use crate::error::CollectError;
use crate::merge::ShardMergeIterator;
use crate::side_effects::SideEffects;
use crate::transform::MapReduce;

/// Campo por el que se agrupa (viaja en el estado de la transformación).
pub const GROUP_FIELD: &str = "sidefx.groupCount.field";

/// Cuenta registros agrupando por el valor de un campo.
/// Resultado: `{ "<grupo>": cantidad }` bajo su clave.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCount {
    key: String,
    field: String,
    stages: StageSet,
}

impl GroupCount {
    pub fn new(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            stages: StageSet::all(),
        }
    }

    /// Sin etapas: no corre ningún job y relee la salida de una corrida anterior.
    pub fn reading_previous_output(mut self) -> Self {
        self.stages = StageSet::empty();
        self
    }

    /// Reconstruye la transformación desde la configuración del job.
    pub fn from_config(key: impl Into<String>, config: &JobConfig) -> anyhow::Result<Self> {
        let field = config
            .get(GROUP_FIELD)
            .with_context(|| format!("falta {} en la configuración", GROUP_FIELD))?;
        Ok(Self::new(key, field))
    }
}

fn group_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MapReduce for GroupCount {
    fn side_effect_key(&self) -> &str {
        &self.key
    }

    fn stages(&self) -> StageSet {
        self.stages
    }

    fn store_state(&self) -> Value {
        json!({ GROUP_FIELD: self.field })
    }

    fn map(&self, record: &Value, emit: &mut Vec<KvPair>) {
        // registros sin el campo no cuentan
        if let Some(group) = record.get(&self.field) {
            emit.push(KvPair::new(group.clone(), 1_u64));
        }
    }

    fn reduce(&self, key: &Value, values: Vec<Value>, emit: &mut Vec<KvPair>) {
        let total: u64 = values.iter().filter_map(Value::as_u64).sum();
        emit.push(KvPair::new(key.clone(), total));
    }

    fn add_to_side_effects(
        &self,
        side_effects: &mut SideEffects,
        pairs: ShardMergeIterator,
    ) -> Result<(), CollectError> {
        let mut counts: Map<String, Value> = Map::new();
        for pair in pairs {
            let pair = pair?;
            let add = pair.value.as_u64().unwrap_or(0);
            let entry = counts.entry(group_name(&pair.key)).or_insert(json!(0_u64));
            *entry = json!(entry.as_u64().unwrap_or(0) + add);
        }
        side_effects.set(self.key.clone(), Value::Object(counts));
        Ok(())
    }
}
