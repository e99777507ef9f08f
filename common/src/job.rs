use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{JobConfig, OutputFormat};
use crate::stage::{Stage, StageSet};

pub type JobId = String;

/// Qué roles registra el job. MAP siempre está si hay job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRoles {
    pub map: bool,
    pub combine: bool,
    pub reduce: bool,
}

impl ExecutionRoles {
    pub fn from_stages(stages: StageSet) -> Self {
        Self {
            map: stages.contains(Stage::Map),
            combine: stages.contains(Stage::Combine),
            reduce: stages.contains(Stage::Reduce),
        }
    }

    pub fn is_map_only(&self) -> bool {
        !self.combine && !self.reduce
    }
}

/// Job listo para mandar al engine. Se arma a partir de un descriptor
/// y no se guarda después de que el job termina.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Clave de la transformación (identifica el job en los logs)
    pub name: String,

    /// Transformación que el engine tiene que instanciar
    pub transform: String,

    /// Configuración efectiva: base + estado de la transformación
    pub config: JobConfig,

    pub input_path: PathBuf,
    pub output_path: PathBuf,

    pub roles: ExecutionRoles,

    /// 0 si no hay etapa REDUCE (job sólo map, sin shuffle)
    pub reduce_tasks: u32,

    pub output_format: OutputFormat,

    /// Envoltorio de los registros entre etapas
    pub envelope: String,
}

/* --------- Tipos del API HTTP del master --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Running,
    Failed,
    Succeeded,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub output_dir: String,

    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Motivo del fallo, si el job terminó en FAILED
    #[serde(default)]
    pub error: Option<String>,
}
