use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, env, fmt, path::PathBuf};
use thiserror::Error;

/// Directorio raíz donde quedan las salidas de los jobs.
pub const OUTPUT_LOCATION: &str = "sidefx.output.location";
/// Directorio del dataset materializado que lee la etapa MAP.
pub const INPUT_LOCATION: &str = "sidefx.input.location";
/// Formato de salida del job ("sequence" o "text").
pub const OUTPUT_FORMAT: &str = "sidefx.output.format";
/// Cantidad de reducers cuando la etapa REDUCE está activa.
pub const REDUCE_TASKS: &str = "sidefx.reduce.tasks";
/// Nombre de la transformación que el engine tiene que instanciar.
pub const TRANSFORM_NAME: &str = "sidefx.transform";

pub const DEFAULT_OUTPUT_LOCATION: &str = "/data/output";
/// Tope de `sidefx.reduce.tasks`: cada reducer es una partición en memoria.
pub const MAX_REDUCE_TASKS: u32 = 10_000;
/// Subdirectorio del root donde vive el dataset materializado.
pub const DATASET_DIR: &str = "~g";

const ENV_PREFIX: &str = "SIDEFX_";

const KNOWN_KEYS: [&str; 5] = [
    OUTPUT_LOCATION,
    INPUT_LOCATION,
    OUTPUT_FORMAT,
    REDUCE_TASKS,
    TRANSFORM_NAME,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("estado de transformación inválido: {0}")]
    MalformedState(String),
    #[error("valor inválido para {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Configuración de un job: mapa ordenado clave -> valor (texto).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobConfig {
    entries: BTreeMap<String, String>,
}

impl JobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuración a partir de las variables de entorno `SIDEFX_*`.
    /// Ej: SIDEFX_OUTPUT_LOCATION -> sidefx.output.location
    pub fn from_env() -> Self {
        Self::from_env_with_keys(&[])
    }

    /// Como `from_env`, pero reconoce además las claves de `extra_keys`.
    ///
    /// Los nombres de variables no distinguen mayúsculas, así que una clave como
    /// `sidefx.groupCount.field` sólo se recupera si aparece acá. Las variables
    /// que no corresponden a ninguna clave conocida quedan en minúsculas.
    pub fn from_env_with_keys(extra_keys: &[&str]) -> Self {
        let known: Vec<&str> = KNOWN_KEYS.iter().chain(extra_keys).copied().collect();
        let mut config = Self::new();
        for (name, value) in env::vars() {
            if let Some(rest) = name.strip_prefix(ENV_PREFIX) {
                let key = format!("sidefx.{}", rest.to_ascii_lowercase().replace('_', "."));
                let key = match known.iter().find(|k| k.eq_ignore_ascii_case(&key)) {
                    Some(k) => k.to_string(),
                    None => key,
                };
                config.set(key, value);
            }
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Devuelve una copia con el estado de la transformación aplicado encima.
    /// `self` no se modifica.
    ///
    /// El estado tiene que ser `null` o un objeto JSON de valores escalares:
    /// strings tal cual, números/bools como texto, `null` borra la clave.
    pub fn merged_with_state(&self, state: &Value) -> Result<JobConfig, ConfigError> {
        let mut merged = self.clone();

        let map = match state {
            Value::Null => return Ok(merged),
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::MalformedState(format!(
                    "se esperaba un objeto JSON y llegó {}",
                    json_kind(other)
                )))
            }
        };

        for (key, value) in map {
            match value {
                Value::Null => {
                    merged.remove(key);
                }
                Value::String(s) => merged.set(key.clone(), s.clone()),
                Value::Bool(b) => merged.set(key.clone(), b.to_string()),
                Value::Number(n) => merged.set(key.clone(), n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ConfigError::MalformedState(format!(
                        "el valor de '{}' es {} (sólo se aceptan escalares)",
                        key,
                        json_kind(value)
                    )))
                }
            }
        }

        Ok(merged)
    }

    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(self.get_or(OUTPUT_LOCATION, DEFAULT_OUTPUT_LOCATION))
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_name(self.get_or(OUTPUT_FORMAT, OutputFormat::Sequence.name()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "un bool",
        Value::Number(_) => "un número",
        Value::String(_) => "un string",
        Value::Array(_) => "un array",
        Value::Object(_) => "un objeto",
    }
}

/// Formato en el que un job escribe sus shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum OutputFormat {
    /// Un registro `{"k":..,"v":..}` por línea. Es el único que se puede leer de vuelta.
    Sequence,
    /// Líneas CSV `clave,valor`, pensadas para humanos.
    Text,
    Other(String),
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sequence" => OutputFormat::Sequence,
            "text" => OutputFormat::Text,
            _ => OutputFormat::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OutputFormat::Sequence => "sequence",
            OutputFormat::Text => "text",
            OutputFormat::Other(name) => name,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, OutputFormat::Sequence)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for OutputFormat {
    fn from(name: String) -> Self {
        OutputFormat::from_name(&name)
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.name().to_string()
    }
}
