use std::{io, path::PathBuf};
use thiserror::Error;

use common::{ConfigError, DescriptorError};

/// Errores que impiden mandar un job. Los fallos del engine no están acá:
/// llegan como `Outcome::Failed`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no se pudo crear el runtime para esperar el job: {0}")]
    Runtime(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no se pudo listar {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error leyendo shard {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no quedan pares en la secuencia")]
    EndOfSequence,
}

impl CollectError {
    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, CollectError::EndOfSequence)
    }
}

/// Errores de la ejecución completa: job + recolección de side-effects.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("el job {key} falló: {cause:#}")]
    JobFailed { key: String, cause: anyhow::Error },
    #[error(transparent)]
    Collect(#[from] CollectError),
}
