use std::{path::PathBuf, sync::Arc};

use common::{
    config::{DATASET_DIR, INPUT_LOCATION, MAX_REDUCE_TASKS, REDUCE_TASKS, TRANSFORM_NAME},
    record::KV_ENVELOPE,
    ConfigError, ExecutionRoles, JobConfig, JobDescription, Stage, TransformDescriptor,
};

use crate::engine::ExecutionEngine;
use crate::error::SubmitError;
use crate::sink::{EventSink, TracingSink};

/// Prefijo del mensaje que identifica cada job enviado.
pub const JOB_LOG_PREFIX: &str = "sidefx job: ";

/// Resultado de `JobSubmitter::run`.
#[derive(Debug)]
pub enum Outcome {
    /// El job terminó bien; los shards están en la ruta.
    Completed(PathBuf),
    /// No hubo job (la transformación no tiene MAP); se lee una salida previa.
    Skipped(PathBuf),
    /// El engine reportó un fallo. No se asume ninguna salida legible.
    Failed(anyhow::Error),
}

impl Outcome {
    /// Ruta de salida legible, si la hay.
    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            Outcome::Completed(path) | Outcome::Skipped(path) => Some(path),
            Outcome::Failed(_) => None,
        }
    }
}

/// Qué hay que hacer con un descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Skip { output_path: PathBuf },
    Submit(JobDescription),
}

/// Arma el plan de un descriptor sin ejecutar nada.
///
/// - mezcla el estado del descriptor sobre una copia de `base`
/// - sin MAP: `Skip` con la ruta `<root>/<clave saneada>`, con el root de `base`
/// - con MAP: job con map siempre, combine/reduce según las etapas y
///   0 reducers cuando no hay REDUCE
pub fn describe_job(
    descriptor: &TransformDescriptor,
    base: &JobConfig,
) -> Result<Plan, SubmitError> {
    let config = base.merged_with_state(descriptor.state())?;

    // la salida previa se busca donde la dejó el caller, no donde diga el estado
    if !descriptor.does_stage(Stage::Map) {
        let output_path = base.output_root().join(descriptor.output_dir_name());
        return Ok(Plan::Skip { output_path });
    }

    let root = config.output_root();
    let output_path = root.join(descriptor.output_dir_name());

    let roles = ExecutionRoles::from_stages(descriptor.stages());

    // sin REDUCE no hay shuffle: el job tiene que pedir explícitamente 0 reducers
    let reduce_tasks = if roles.reduce {
        let tasks = config.get_u32(REDUCE_TASKS)?.unwrap_or(1).max(1);
        if tasks > MAX_REDUCE_TASKS {
            return Err(ConfigError::InvalidValue {
                key: REDUCE_TASKS.to_string(),
                value: tasks.to_string(),
            }
            .into());
        }
        tasks
    } else {
        0
    };

    let input_path = match config.get(INPUT_LOCATION) {
        Some(dir) => PathBuf::from(dir),
        None => root.join(DATASET_DIR),
    };

    let transform = config
        .get(TRANSFORM_NAME)
        .unwrap_or(descriptor.key())
        .to_string();
    let output_format = config.output_format();

    Ok(Plan::Submit(JobDescription {
        name: descriptor.key().to_string(),
        transform,
        config,
        input_path,
        output_path,
        roles,
        reduce_tasks,
        output_format,
        envelope: KV_ENVELOPE.to_string(),
    }))
}

/// Envía transformaciones al engine y espera a que terminen.
pub struct JobSubmitter<E> {
    engine: E,
    sink: Arc<dyn EventSink>,
}

impl<E: ExecutionEngine> JobSubmitter<E> {
    pub fn new(engine: E) -> Self {
        Self::with_sink(engine, Arc::new(TracingSink))
    }

    pub fn with_sink(engine: E, sink: Arc<dyn EventSink>) -> Self {
        Self { engine, sink }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    /// Envía el job (si corresponde) y espera la única señal de fin del engine.
    ///
    /// No tiene timeout ni cancelación: quien necesite acotar la espera puede
    /// envolver el future con `tokio::time::timeout`.
    pub async fn run(
        &self,
        descriptor: &TransformDescriptor,
        base: &JobConfig,
    ) -> Result<Outcome, SubmitError> {
        let job = match describe_job(descriptor, base)? {
            Plan::Skip { output_path } => return Ok(Outcome::Skipped(output_path)),
            Plan::Submit(job) => job,
        };

        self.sink.info(&format!("{}{}", JOB_LOG_PREFIX, job.name));

        match self.engine.submit(&job).await {
            Ok(()) => Ok(Outcome::Completed(job.output_path)),
            Err(cause) => Ok(Outcome::Failed(cause)),
        }
    }

    /// Versión bloqueante de `run` para hosts sin runtime async.
    /// No se puede llamar desde dentro de un runtime de tokio.
    pub fn run_blocking(
        &self,
        descriptor: &TransformDescriptor,
        base: &JobConfig,
    ) -> Result<Outcome, SubmitError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SubmitError::Runtime)?;
        rt.block_on(self.run(descriptor, base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use common::{
        config::{OUTPUT_FORMAT, OUTPUT_LOCATION},
        OutputFormat, StageSet,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Engine falso: guarda los jobs recibidos y responde lo configurado.
    #[derive(Default)]
    struct FakeEngine {
        submitted: Mutex<Vec<JobDescription>>,
        fail_with: Option<String>,
    }

    impl FakeEngine {
        fn failing(msg: &str) -> Self {
            Self {
                fail_with: Some(msg.to_string()),
                ..Self::default()
            }
        }

        fn submitted(&self) -> Vec<JobDescription> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionEngine for FakeEngine {
        async fn submit(&self, job: &JobDescription) -> anyhow::Result<()> {
            self.submitted.lock().unwrap().push(job.clone());
            match &self.fail_with {
                Some(msg) => Err(anyhow!(msg.clone())),
                None => Ok(()),
            }
        }
    }

    fn base() -> JobConfig {
        JobConfig::new().with(OUTPUT_LOCATION, "/tmp/sidefx")
    }

    fn descriptor(key: &str, stages: StageSet) -> TransformDescriptor {
        TransformDescriptor::new(key, stages, Value::Null).unwrap()
    }

    #[test]
    fn sin_map_no_envia_job_y_devuelve_skipped() {
        let submitter = JobSubmitter::new(FakeEngine::default());

        let outcome = submitter
            .run_blocking(&descriptor("~prev", StageSet::empty()), &base())
            .unwrap();

        match outcome {
            Outcome::Skipped(path) => assert_eq!(path, PathBuf::from("/tmp/sidefx/%7Eprev")),
            other => panic!("se esperaba Skipped, llegó {other:?}"),
        }
        assert!(submitter.engine().submitted().is_empty());
    }

    #[test]
    fn map_sin_reduce_pide_cero_reducers() {
        let stages = StageSet::map_only().with(Stage::Combine);
        let base = base().with(REDUCE_TASKS, "8");

        let Plan::Submit(job) = describe_job(&descriptor("k", stages), &base).unwrap() else {
            panic!("se esperaba un job");
        };

        assert_eq!(job.reduce_tasks, 0);
        assert!(job.roles.map);
        assert!(job.roles.combine);
        assert!(!job.roles.reduce);
    }

    #[test]
    fn map_only_no_registra_combine_ni_reduce() {
        let Plan::Submit(job) = describe_job(&descriptor("k", StageSet::map_only()), &base()).unwrap()
        else {
            panic!("se esperaba un job");
        };

        assert!(job.roles.is_map_only());
        assert_eq!(job.reduce_tasks, 0);
    }

    #[test]
    fn reduce_usa_reducers_configurados_con_minimo_uno() {
        let d = descriptor("k", StageSet::all());

        let Plan::Submit(job) = describe_job(&d, &base()).unwrap() else {
            panic!("se esperaba un job");
        };
        assert_eq!(job.reduce_tasks, 1);

        let Plan::Submit(job) = describe_job(&d, &base().with(REDUCE_TASKS, "4")).unwrap() else {
            panic!("se esperaba un job");
        };
        assert_eq!(job.reduce_tasks, 4);

        let Plan::Submit(job) = describe_job(&d, &base().with(REDUCE_TASKS, "0")).unwrap() else {
            panic!("se esperaba un job");
        };
        assert_eq!(job.reduce_tasks, 1);
    }

    #[test]
    fn reducers_por_encima_del_tope_se_rechazan() {
        let d = descriptor("k", StageSet::all());

        let err = describe_job(&d, &base().with(REDUCE_TASKS, "4000000000")).unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Config(ConfigError::InvalidValue { ref key, .. }) if key == REDUCE_TASKS
        ));

        let max = MAX_REDUCE_TASKS.to_string();
        let Plan::Submit(job) = describe_job(&d, &base().with(REDUCE_TASKS, max)).unwrap() else {
            panic!("se esperaba un job");
        };
        assert_eq!(job.reduce_tasks, MAX_REDUCE_TASKS);
    }

    #[test]
    fn sin_map_usa_el_root_de_la_base_aunque_el_estado_lo_cambie() {
        let d = TransformDescriptor::new(
            "k",
            StageSet::empty(),
            json!({ OUTPUT_LOCATION: "/otro/lugar" }),
        )
        .unwrap();

        let plan = describe_job(&d, &base()).unwrap();

        assert_eq!(
            plan,
            Plan::Skip {
                output_path: PathBuf::from("/tmp/sidefx/k")
            }
        );
    }

    #[test]
    fn combine_sin_map_toma_el_camino_de_lectura() {
        let d = descriptor("k", StageSet::empty().with(Stage::Combine));
        let submitter = JobSubmitter::new(FakeEngine::default());

        let outcome = submitter.run_blocking(&d, &base()).unwrap();

        assert!(matches!(outcome, Outcome::Skipped(ref p) if p == &PathBuf::from("/tmp/sidefx/k")));
        assert!(submitter.engine().submitted().is_empty());
    }

    #[test]
    fn reducers_no_numericos_es_error_de_configuracion() {
        let err = describe_job(
            &descriptor("k", StageSet::all()),
            &base().with(REDUCE_TASKS, "muchos"),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rutas_de_entrada_y_salida_derivan_del_root() {
        let Plan::Submit(job) = describe_job(&descriptor("a/b", StageSet::map_only()), &base()).unwrap()
        else {
            panic!("se esperaba un job");
        };

        assert_eq!(job.input_path, PathBuf::from("/tmp/sidefx/~g"));
        assert_eq!(job.output_path, PathBuf::from("/tmp/sidefx/a%2Fb"));
        assert_eq!(job.transform, "a/b");
        assert_eq!(job.envelope, KV_ENVELOPE);
        assert_eq!(job.output_format, OutputFormat::Sequence);
    }

    #[test]
    fn el_estado_se_mezcla_en_la_configuracion_del_job() {
        let d = TransformDescriptor::new(
            "k",
            StageSet::map_only(),
            json!({ INPUT_LOCATION: "/datos", OUTPUT_FORMAT: "text", "x": 1 }),
        )
        .unwrap();
        let base = base();

        let Plan::Submit(job) = describe_job(&d, &base).unwrap() else {
            panic!("se esperaba un job");
        };

        assert_eq!(job.input_path, PathBuf::from("/datos"));
        assert_eq!(job.output_format, OutputFormat::Text);
        assert_eq!(job.config.get("x"), Some("1"));
        // la base del caller no cambia
        assert!(!base.contains("x"));
    }

    #[test]
    fn estado_mal_formado_falla_antes_de_enviar() {
        let d = TransformDescriptor::new("k", StageSet::all(), json!("no-es-objeto")).unwrap();
        let submitter = JobSubmitter::new(FakeEngine::default());

        let err = submitter.run_blocking(&d, &base()).unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Config(ConfigError::MalformedState(_))
        ));
        assert!(submitter.engine().submitted().is_empty());
    }

    #[tokio::test]
    async fn run_envia_una_vez_y_loguea_la_clave() {
        let sink = Arc::new(MemorySink::new());
        let submitter = JobSubmitter::with_sink(FakeEngine::default(), sink.clone());

        let outcome = submitter
            .run(&descriptor("count", StageSet::all()), &base())
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Completed(ref p) if p == &PathBuf::from("/tmp/sidefx/count")));
        assert_eq!(submitter.engine().submitted().len(), 1);
        assert_eq!(sink.infos(), vec![format!("{JOB_LOG_PREFIX}count")]);
    }

    #[tokio::test]
    async fn fallo_del_engine_llega_como_failed() {
        let submitter = JobSubmitter::new(FakeEngine::failing("nodo caído"));

        let outcome = submitter
            .run(&descriptor("count", StageSet::map_only()), &base())
            .await
            .unwrap();

        assert!(outcome.output_path().is_none());
        match outcome {
            Outcome::Failed(cause) => assert!(cause.to_string().contains("nodo caído")),
            other => panic!("se esperaba Failed, llegó {other:?}"),
        }
    }
}
