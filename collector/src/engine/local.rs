use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap},
    fs,
    hash::{Hash, Hasher},
    path::Path,
    sync::Arc,
};
use tracing::{debug, info};

use common::{
    config::MAX_REDUCE_TASKS,
    shard::{self, ShardWriter},
    JobConfig, JobDescription, KvPair, OutputFormat,
};

use super::ExecutionEngine;
use crate::transform::MapReduce;

type TransformFactory = Arc<dyn Fn(&JobConfig) -> Result<Arc<dyn MapReduce>> + Send + Sync>;

/// Engine que corre el job dentro del proceso, en el pool de hilos bloqueantes.
///
/// Las transformaciones se registran por nombre y se instancian a partir de la
/// configuración efectiva del job, igual que haría un worker remoto.
#[derive(Clone, Default)]
pub struct LocalEngine {
    factories: HashMap<String, TransformFactory>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform<F, T>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&JobConfig) -> Result<T> + Send + Sync + 'static,
        T: MapReduce + 'static,
    {
        let factory: TransformFactory =
            Arc::new(move |config: &JobConfig| Ok(Arc::new(factory(config)?) as Arc<dyn MapReduce>));
        self.factories.insert(name.into(), factory);
        self
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn submit(&self, job: &JobDescription) -> Result<()> {
        let factory = self
            .factories
            .get(&job.transform)
            .ok_or_else(|| anyhow!("transformación desconocida: {}", job.transform))?;
        let transform = factory(&job.config)
            .with_context(|| format!("no se pudo instanciar {}", job.transform))?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "job local {} ({}) input={} output={} reducers={}",
            job_id,
            job.name,
            job.input_path.display(),
            job.output_path.display(),
            job.reduce_tasks
        );

        let job_cloned = job.clone();
        let handle = tokio::task::spawn_blocking(move || run_job(transform.as_ref(), &job_cloned));

        match handle.await {
            Ok(Ok(())) => {
                let elapsed = Utc::now() - started_at;
                info!(
                    "job local {} terminó en {} ms",
                    job_id,
                    elapsed.num_milliseconds()
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e.context(format!("job local {} ({}) falló", job_id, job.name))),
            Err(e) => Err(anyhow!("panic o join error en el job {}: {:?}", job_id, e)),
        }
    }
}

/* =========================
   Ejecución de un job
   ========================= */

/// Corre map (+ combine) por archivo de entrada y, si hay REDUCE,
/// shuffle por hash de clave a `reduce_tasks` particiones.
fn run_job(transform: &dyn MapReduce, job: &JobDescription) -> Result<()> {
    if !job.roles.map {
        bail!("el job {} no tiene rol map", job.name);
    }
    if let OutputFormat::Other(name) = &job.output_format {
        bail!("formato de salida no soportado: {}", name);
    }
    if job.reduce_tasks > MAX_REDUCE_TASKS {
        bail!(
            "demasiados reducers: {} (máximo {})",
            job.reduce_tasks,
            MAX_REDUCE_TASKS
        );
    }

    prepare_output_dir(&job.output_path)?;

    let inputs = shard::list_shards(&job.input_path)
        .with_context(|| format!("no se pudo listar la entrada {}", job.input_path.display()))?;

    // 1) Map (+ combine) por archivo de entrada: una tarea map por archivo
    let mut map_outputs: Vec<Vec<KvPair>> = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let records = shard::read_records(input)
            .with_context(|| format!("error leyendo {}", input.display()))?;

        let mut emitted = Vec::new();
        for rec in &records {
            transform.map(rec, &mut emitted);
        }

        if job.roles.combine {
            emitted = apply_grouped(emitted, |k, vs, out| transform.combine(k, vs, out));
        }

        debug!(
            "map {}: {} registros -> {} pares",
            input.display(),
            records.len(),
            emitted.len()
        );
        map_outputs.push(emitted);
    }

    // 2) Sin REDUCE la salida de cada map es directamente un shard
    if !job.roles.reduce {
        for (i, pairs) in map_outputs.iter().enumerate() {
            let path = job.output_path.join(shard::map_shard_name(i));
            write_shard(&path, &job.output_format, pairs)?;
        }
        shard::write_success_marker(&job.output_path)?;
        return Ok(());
    }

    // 3) Shuffle: clave -> partición por hash(clave)
    let num_partitions = job.reduce_tasks.max(1);
    let mut partitions: Vec<Vec<KvPair>> = vec![Vec::new(); num_partitions as usize];
    for pair in map_outputs.into_iter().flatten() {
        let pid = hash_key_to_partition(&pair.key, num_partitions) as usize;
        partitions[pid].push(pair);
    }

    // 4) Reduce por partición
    for (i, part) in partitions.into_iter().enumerate() {
        let reduced = apply_grouped(part, |k, vs, out| transform.reduce(k, vs, out));
        let path = job.output_path.join(shard::reduce_shard_name(i));
        write_shard(&path, &job.output_format, &reduced)?;
    }

    shard::write_success_marker(&job.output_path)?;
    Ok(())
}

/// Agrupa por clave y aplica `f` a cada grupo.
/// Determinista: los grupos salen ordenados por el texto JSON de la clave.
fn apply_grouped<F>(pairs: Vec<KvPair>, mut f: F) -> Vec<KvPair>
where
    F: FnMut(&Value, Vec<Value>, &mut Vec<KvPair>),
{
    let mut groups: BTreeMap<String, (Value, Vec<Value>)> = BTreeMap::new();
    for KvPair { key, value } in pairs {
        groups
            .entry(key.to_string())
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(value);
    }

    let mut out = Vec::new();
    for (_, (key, values)) in groups {
        f(&key, values, &mut out);
    }
    out
}

fn hash_key_to_partition(key: &Value, num_partitions: u32) -> u32 {
    let mut h = DefaultHasher::new();
    key.to_string().hash(&mut h);
    (h.finish() % num_partitions as u64) as u32
}

/// Crea el directorio de salida. Si ya tiene shards de otra corrida, falla.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        let existing = shard::list_shards(dir)
            .with_context(|| format!("no se pudo listar {}", dir.display()))?;
        if !existing.is_empty() {
            bail!(
                "el directorio de salida {} ya existe con {} archivos",
                dir.display(),
                existing.len()
            );
        }
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("no se pudo crear {}", dir.display()))?;
    Ok(())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_shard(path: &Path, format: &OutputFormat, pairs: &[KvPair]) -> Result<()> {
    match format {
        OutputFormat::Sequence => {
            let mut writer = ShardWriter::create(path)?;
            for pair in pairs {
                writer.append(pair)?;
            }
            writer.finish()?;
        }
        OutputFormat::Text => {
            // líneas "clave,valor" sin encabezado
            let mut writer = csv::Writer::from_path(path)?;
            for pair in pairs {
                writer.write_record([value_text(&pair.key), value_text(&pair.value)])?;
            }
            writer.flush()?;
        }
        OutputFormat::Other(name) => bail!("formato de salida no soportado: {}", name),
    }
    Ok(())
}
