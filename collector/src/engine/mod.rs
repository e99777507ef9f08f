pub mod http;
pub mod local;

use async_trait::async_trait;
use std::sync::Arc;

use common::JobDescription;

pub use http::HttpEngine;
pub use local::LocalEngine;

/// Motor de ejecución distribuido (externo). El collector sólo manda
/// la descripción y espera una única señal de fin.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Resuelve una sola vez, cuando el job terminó (Ok) o falló (Err).
    async fn submit(&self, job: &JobDescription) -> anyhow::Result<()>;
}

#[async_trait]
impl<E> ExecutionEngine for Arc<E>
where
    E: ExecutionEngine + ?Sized,
{
    async fn submit(&self, job: &JobDescription) -> anyhow::Result<()> {
        (**self).submit(job).await
    }
}
