use serde_json::Value;
use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::key::is_hidden_name;
use crate::record::KvPair;

/// Marcador que deja un job al terminar bien. Nunca se lee como shard.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Nombre del shard `index` producido por una tarea map.
pub fn map_shard_name(index: usize) -> String {
    format!("part-m-{:05}", index)
}

/// Nombre del shard `index` producido por una tarea reduce.
pub fn reduce_shard_name(index: usize) -> String {
    format!("part-r-{:05}", index)
}

/// Lista los archivos visibles de `dir` (sin `.xxx` ni `_xxx`), ordenados por nombre.
/// Subdirectorios se ignoran.
pub fn list_shards(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if is_hidden_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        out.push(path);
    }

    // determinista: el orden de read_dir depende del filesystem
    out.sort();
    Ok(out)
}

/// Escribe el marcador `_SUCCESS` en `dir`.
pub fn write_success_marker(dir: &Path) -> io::Result<()> {
    File::create(dir.join(SUCCESS_MARKER))?;
    Ok(())
}

/// Lee un archivo JSONL (un registro por línea) del dataset de entrada.
pub fn read_records(path: &Path) -> io::Result<Vec<Value>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: Value = serde_json::from_str(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("error al parsear {}: {e}", path.display()),
            )
        })?;
        out.push(rec);
    }

    Ok(out)
}

/* =========================
   Escritura de shards
   ========================= */

pub struct ShardWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    records: u64,
}

impl ShardWriter {
    /// Crea el shard (y su directorio padre si hace falta).
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            records: 0,
        })
    }

    pub fn append(&mut self, pair: &KvPair) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, pair)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hace flush y devuelve cuántos registros se escribieron.
    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.records)
    }
}

/* =========================
   Lectura secuencial de shards
   ========================= */

/// Lector secuencial de un shard. El archivo se cierra al hacer drop.
pub struct ShardReader {
    reader: BufReader<File>,
    path: PathBuf,
    line: u64,
    buf: String,
}

impl ShardReader {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;

        Ok(Self {
            reader: BufReader::new(file),
            path,
            line: 0,
            buf: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Siguiente par del shard, `None` al llegar al final.
    ///
    /// Una línea que no se puede parsear es `InvalidData`; si además le falta
    /// el salto de línea final (registro cortado) es `UnexpectedEof`.
    pub fn next_pair(&mut self) -> io::Result<Option<KvPair>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let complete = self.buf.ends_with('\n');
            let line = self.buf.trim();
            if line.is_empty() {
                if complete {
                    continue;
                }
                return Ok(None);
            }

            return match serde_json::from_str::<KvPair>(line) {
                Ok(pair) => Ok(Some(pair)),
                Err(e) => {
                    let kind = if complete {
                        io::ErrorKind::InvalidData
                    } else {
                        io::ErrorKind::UnexpectedEof
                    };
                    Err(io::Error::new(
                        kind,
                        format!(
                            "registro inválido en {}:{}: {e}",
                            self.path.display(),
                            self.line
                        ),
                    ))
                }
            };
        }
    }
}
