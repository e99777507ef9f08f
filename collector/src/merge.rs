use std::{
    collections::VecDeque,
    iter::FusedIterator,
    mem,
    path::{Path, PathBuf},
};
use tracing::debug;

use common::{
    config::OUTPUT_FORMAT,
    shard::{list_shards, ShardReader},
    JobConfig, KvPair,
};

use crate::error::CollectError;
use crate::sink::EventSink;

enum State {
    /// Sin par pendiente; hay que avanzar para saber si queda algo.
    Idle,
    /// Un par leído por adelantado (lookahead de un solo elemento).
    Buffered(KvPair),
    /// Terminal: no quedan shards o hubo un error de lectura.
    Exhausted,
}

/// Secuencia perezosa de pares sobre todos los shards de un directorio de salida.
///
/// Los shards se recorren en orden de nombre y, dentro de cada uno, en el orden
/// en que fueron escritos. Cada lector se abre recién cuando le toca y se cierra
/// apenas se agota (o cuando se descarta el iterador).
///
/// No es reiniciable: una vez agotado queda agotado.
pub struct ShardMergeIterator {
    pending: VecDeque<PathBuf>,
    current: Option<ShardReader>,
    state: State,
}

impl ShardMergeIterator {
    /// Abre la salida de un job según su configuración efectiva.
    ///
    /// Si el formato de salida no es `sequence` no hay forma segura de convertir
    /// los archivos en pares: se emite un warning y se devuelve una secuencia vacía.
    pub fn open(
        config: &JobConfig,
        output_path: &Path,
        sink: &dyn EventSink,
    ) -> Result<Self, CollectError> {
        let format = config.output_format();
        if !format.is_sequence() {
            sink.warn(&format!(
                "{} es '{}' y no 'sequence': los side-effects en {} no se pueden convertir a valores",
                OUTPUT_FORMAT,
                format,
                output_path.display()
            ));
            return Ok(Self::empty());
        }
        Self::from_dir(output_path)
    }

    /// Lista los shards visibles de `output_path`. No abre ninguno todavía.
    pub fn from_dir(output_path: &Path) -> Result<Self, CollectError> {
        let shards = list_shards(output_path).map_err(|source| CollectError::Listing {
            path: output_path.to_path_buf(),
            source,
        })?;
        debug!("{} shards en {}", shards.len(), output_path.display());
        Ok(Self::from_shards(shards))
    }

    pub fn from_shards(shards: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pending: shards.into_iter().collect(),
            current: None,
            state: State::Idle,
        }
    }

    pub fn empty() -> Self {
        Self::from_shards(Vec::new())
    }

    /// Shards que todavía no se terminaron de leer (incluye el abierto).
    pub fn remaining_shards(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Indica si queda al menos un par. Idempotente: si ya hay un par en el
    /// buffer (o el iterador está agotado) no avanza.
    pub fn has_next(&mut self) -> Result<bool, CollectError> {
        match self.state {
            State::Buffered(_) => Ok(true),
            State::Exhausted => Ok(false),
            State::Idle => match self.advance()? {
                Some(pair) => {
                    self.state = State::Buffered(pair);
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Devuelve el siguiente par. Pedirlo sobre un iterador agotado es un error
    /// de programación y se reporta como `EndOfSequence`.
    pub fn next_pair(&mut self) -> Result<KvPair, CollectError> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Buffered(pair) => Ok(pair),
            State::Exhausted => {
                self.state = State::Exhausted;
                Err(CollectError::EndOfSequence)
            }
            State::Idle => self.advance()?.ok_or(CollectError::EndOfSequence),
        }
    }

    /// Lee del shard del frente; descarta los que se agotan y sigue con el próximo.
    /// Cuando no queda ninguno pasa a `Exhausted`.
    fn advance(&mut self) -> Result<Option<KvPair>, CollectError> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.pending.pop_front() else {
                    self.state = State::Exhausted;
                    return Ok(None);
                };
                match ShardReader::open(&path) {
                    Ok(reader) => self.current = Some(reader),
                    Err(source) => {
                        self.abandon();
                        return Err(CollectError::Read { path, source });
                    }
                }
            }

            let Some(reader) = self.current.as_mut() else {
                continue;
            };

            match reader.next_pair() {
                Ok(Some(pair)) => return Ok(Some(pair)),
                Ok(None) => {
                    debug!("shard agotado: {}", reader.path().display());
                    // al soltar el lector se cierra el archivo
                    self.current = None;
                }
                Err(source) => {
                    let path = reader.path().to_path_buf();
                    self.abandon();
                    return Err(CollectError::Read { path, source });
                }
            }
        }
    }

    /// Tras un error de lectura no se reintenta: se cierran y se descartan los shards restantes.
    fn abandon(&mut self) {
        self.current = None;
        self.pending.clear();
        self.state = State::Exhausted;
    }
}

impl Iterator for ShardMergeIterator {
    type Item = Result<KvPair, CollectError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_pair()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl FusedIterator for ShardMergeIterator {}

impl Drop for ShardMergeIterator {
    fn drop(&mut self) {
        let remaining = self.remaining_shards();
        if remaining > 0 {
            debug!("iterador descartado con {} shards sin terminar", remaining);
        }
    }
}
