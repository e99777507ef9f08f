use serde_json::Value;

use common::{DescriptorError, KvPair, StageSet, TransformDescriptor};

use crate::error::CollectError;
use crate::merge::ShardMergeIterator;
use crate::side_effects::SideEffects;

/// Transformación map/combine/reduce cuyo resultado termina como side-effect.
///
/// El engine reconstruye la transformación a partir de la configuración del
/// job (ver `store_state`), así que todo lo que necesite del lado remoto tiene
/// que viajar en ese estado.
pub trait MapReduce: Send + Sync {
    /// Clave bajo la que queda el resultado (y nombre del directorio de salida).
    fn side_effect_key(&self) -> &str;

    /// Etapas en las que participa. Vacío = sólo leer una salida ya materializada.
    fn stages(&self) -> StageSet;

    /// Estado que se mezcla en la configuración del job (objeto JSON de escalares).
    fn store_state(&self) -> Value {
        Value::Null
    }

    fn map(&self, record: &Value, emit: &mut Vec<KvPair>);

    /// Por defecto deja pasar todos los valores.
    fn reduce(&self, key: &Value, values: Vec<Value>, emit: &mut Vec<KvPair>) {
        for value in values {
            emit.push(KvPair {
                key: key.clone(),
                value,
            });
        }
    }

    fn combine(&self, key: &Value, values: Vec<Value>, emit: &mut Vec<KvPair>) {
        self.reduce(key, values, emit)
    }

    /// Pliega la salida del job en el acumulador.
    /// Por defecto guarda `[[k, v], ...]` bajo la clave de la transformación.
    fn add_to_side_effects(
        &self,
        side_effects: &mut SideEffects,
        pairs: ShardMergeIterator,
    ) -> Result<(), CollectError> {
        let mut out = Vec::new();
        for pair in pairs {
            let (key, value) = pair?.into_tuple();
            out.push(Value::Array(vec![key, value]));
        }
        side_effects.set(self.side_effect_key(), Value::Array(out));
        Ok(())
    }

    fn descriptor(&self) -> Result<TransformDescriptor, DescriptorError> {
        TransformDescriptor::new(self.side_effect_key(), self.stages(), self.store_state())
    }
}
