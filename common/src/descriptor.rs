use serde_json::Value;
use thiserror::Error;

use crate::key::sanitize_key;
use crate::stage::{Stage, StageSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("la clave de la transformación no puede estar vacía")]
    EmptyKey,
    #[error("la etapa {0} requiere MAP")]
    StageWithoutMap(Stage),
}

/// Descripción inmutable de una transformación: qué etapas corre,
/// bajo qué clave deja su resultado y su estado serializado.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformDescriptor {
    key: String,
    stages: StageSet,
    state: Value,
}

impl TransformDescriptor {
    pub fn new(
        key: impl Into<String>,
        stages: StageSet,
        state: Value,
    ) -> Result<Self, DescriptorError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DescriptorError::EmptyKey);
        }
        stages.validate().map_err(DescriptorError::StageWithoutMap)?;

        Ok(Self { key, stages, state })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stages(&self) -> StageSet {
        self.stages
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn does_stage(&self, stage: Stage) -> bool {
        self.stages.contains(stage)
    }

    /// Nombre del directorio de salida bajo el root configurado.
    pub fn output_dir_name(&self) -> String {
        sanitize_key(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_rechaza_clave_vacia() {
        let err = TransformDescriptor::new("   ", StageSet::map_only(), Value::Null).unwrap_err();
        assert_eq!(err, DescriptorError::EmptyKey);
    }

    #[test]
    fn new_rechaza_reduce_sin_map() {
        let stages = StageSet::empty().with(Stage::Reduce);
        let err = TransformDescriptor::new("k", stages, Value::Null).unwrap_err();
        assert_eq!(err, DescriptorError::StageWithoutMap(Stage::Reduce));
    }

    #[test]
    fn descriptor_expone_etapas_y_directorio() {
        let d = TransformDescriptor::new("~count", StageSet::all(), json!({"x": 1})).unwrap();

        assert!(d.does_stage(Stage::Combine));
        assert_eq!(d.key(), "~count");
        assert_eq!(d.output_dir_name(), "%7Ecount");
        assert_eq!(d.state()["x"], json!(1));
    }

    #[test]
    fn descriptor_sin_etapas_es_valido() {
        let d = TransformDescriptor::new("prev", StageSet::empty(), Value::Null).unwrap();
        assert!(!d.does_stage(Stage::Map));
    }
}
