use tracing::{debug, warn};

use common::JobConfig;

use crate::engine::ExecutionEngine;
use crate::error::{PipelineError, SubmitError};
use crate::merge::ShardMergeIterator;
use crate::side_effects::SideEffects;
use crate::submitter::{JobSubmitter, Outcome};
use crate::transform::MapReduce;

/// Corre una transformación y pliega su salida en `side_effects`.
///
/// 1) arma el descriptor y lo manda con `submitter`
/// 2) abre la salida (la del job o una previa si no hubo MAP)
/// 3) `add_to_side_effects` consume los pares
///
/// Si el job falla no se toca el acumulador.
pub async fn execute_map_reduce<E: ExecutionEngine>(
    transform: &dyn MapReduce,
    side_effects: &mut SideEffects,
    submitter: &JobSubmitter<E>,
    base: &JobConfig,
) -> Result<(), PipelineError> {
    let descriptor = transform.descriptor()?;

    let output_path = match submitter.run(&descriptor, base).await? {
        Outcome::Completed(path) => path,
        Outcome::Skipped(path) => {
            debug!(
                "{} sin etapa MAP: se lee la salida existente en {}",
                descriptor.key(),
                path.display()
            );
            path
        }
        Outcome::Failed(cause) => {
            warn!("job {} falló: {:#}", descriptor.key(), cause);
            return Err(PipelineError::JobFailed {
                key: descriptor.key().to_string(),
                cause,
            });
        }
    };

    // misma configuración efectiva que vio el job (incluye el formato de salida)
    let effective = base
        .merged_with_state(descriptor.state())
        .map_err(SubmitError::from)?;
    let pairs = ShardMergeIterator::open(&effective, &output_path, submitter.sink())?;

    transform.add_to_side_effects(side_effects, pairs)?;
    Ok(())
}

/// Versión bloqueante de `execute_map_reduce`.
/// No se puede llamar desde dentro de un runtime de tokio.
pub fn execute_map_reduce_blocking<E: ExecutionEngine>(
    transform: &dyn MapReduce,
    side_effects: &mut SideEffects,
    submitter: &JobSubmitter<E>,
    base: &JobConfig,
) -> Result<(), PipelineError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SubmitError::Runtime)?;
    rt.block_on(execute_map_reduce(transform, side_effects, submitter, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::group_count::GroupCount;
    use crate::sink::MemorySink;
    use common::config::{OUTPUT_FORMAT, OUTPUT_LOCATION};
    use serde_json::json;
    use std::{
        env, fs,
        path::{Path, PathBuf},
        sync::Arc,
    };

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("pipeline_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn write_dataset(tmp: &Path) {
        let dir = tmp.join("~g");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("a.jsonl"),
            "{\"lang\":\"rust\"}\n{\"lang\":\"go\"}\n{\"lang\":\"rust\"}\n",
        )
        .unwrap();
        fs::write(dir.join("b.jsonl"), "{\"lang\":\"zig\"}\n").unwrap();
    }

    fn local_engine() -> LocalEngine {
        LocalEngine::new().with_transform("byLang", |config| GroupCount::from_config("byLang", config))
    }

    fn base(tmp: &Path) -> JobConfig {
        JobConfig::new().with(OUTPUT_LOCATION, tmp.to_string_lossy())
    }

    #[tokio::test]
    async fn job_completo_pliega_los_conteos() {
        let tmp = temp_dir("completo");
        write_dataset(&tmp);
        let submitter = JobSubmitter::new(local_engine());
        let mut se = SideEffects::new();

        execute_map_reduce(&GroupCount::new("byLang", "lang"), &mut se, &submitter, &base(&tmp))
            .await
            .unwrap();

        assert_eq!(
            se.get("byLang"),
            Some(&json!({"go": 1, "rust": 2, "zig": 1}))
        );
    }

    #[tokio::test]
    async fn sin_map_relee_la_salida_anterior() {
        let tmp = temp_dir("relectura");
        write_dataset(&tmp);
        let submitter = JobSubmitter::new(local_engine());
        let base = base(&tmp);

        let mut first = SideEffects::new();
        execute_map_reduce(&GroupCount::new("byLang", "lang"), &mut first, &submitter, &base)
            .await
            .unwrap();

        // el dataset cambia pero sin MAP no se corre nada nuevo
        fs::remove_dir_all(tmp.join("~g")).unwrap();

        let mut second = SideEffects::new();
        let reread = GroupCount::new("byLang", "lang").reading_previous_output();
        execute_map_reduce(&reread, &mut second, &submitter, &base)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn formato_text_deja_el_resultado_vacio_con_warning() {
        let tmp = temp_dir("texto");
        write_dataset(&tmp);
        let sink = Arc::new(MemorySink::new());
        let submitter = JobSubmitter::with_sink(local_engine(), sink.clone());
        let mut se = SideEffects::new();

        execute_map_reduce(
            &GroupCount::new("byLang", "lang"),
            &mut se,
            &submitter,
            &base(&tmp).with(OUTPUT_FORMAT, "text"),
        )
        .await
        .unwrap();

        assert_eq!(se.get("byLang"), Some(&json!({})));
        assert_eq!(sink.warnings().len(), 1);
        // el job igual escribió su salida en texto
        assert!(tmp.join("byLang").join("part-r-00000").exists());
    }

    #[tokio::test]
    async fn fallo_del_job_no_toca_el_acumulador() {
        let tmp = temp_dir("fallo");
        write_dataset(&tmp);
        // ningún factory registrado: el engine no puede instanciar la transformación
        let submitter = JobSubmitter::new(LocalEngine::new());
        let mut se = SideEffects::new();
        se.set("previo", json!(true));

        let err = execute_map_reduce(
            &GroupCount::new("byLang", "lang"),
            &mut se,
            &submitter,
            &base(&tmp),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::JobFailed { ref key, .. } if key == "byLang"));
        assert_eq!(se.keys().collect::<Vec<_>>(), vec!["previo"]);
    }

    #[tokio::test]
    async fn salida_previa_inexistente_es_error_de_listado() {
        let tmp = temp_dir("sin_salida");
        let submitter = JobSubmitter::new(local_engine());
        let mut se = SideEffects::new();

        let err = execute_map_reduce(
            &GroupCount::new("byLang", "lang").reading_previous_output(),
            &mut se,
            &submitter,
            &base(&tmp),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Collect(crate::error::CollectError::Listing { .. })
        ));
        assert!(se.is_empty());
    }

    #[test]
    fn version_bloqueante() {
        let tmp = temp_dir("bloqueante");
        write_dataset(&tmp);
        let submitter = JobSubmitter::new(local_engine());
        let mut se = SideEffects::new();

        execute_map_reduce_blocking(
            &GroupCount::new("byLang", "lang"),
            &mut se,
            &submitter,
            &base(&tmp),
        )
        .unwrap();

        assert_eq!(se.get("byLang").unwrap()["rust"], json!(2));
    }
}
