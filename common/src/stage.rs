use serde::{Deserialize, Serialize};
use std::fmt;

/// Etapas en las que puede participar una transformación.
/// El orden importa: Map < Combine < Reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Map,
    Combine,
    Reduce,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Map, Stage::Combine, Stage::Reduce];

    fn bit(self) -> u8 {
        match self {
            Stage::Map => 0b001,
            Stage::Combine => 0b010,
            Stage::Reduce => 0b100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Map => "MAP",
            Stage::Combine => "COMBINE",
            Stage::Reduce => "REDUCE",
        };
        f.write_str(name)
    }
}

/// Conjunto de etapas (bitset pequeño, `Copy`).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StageSet(u8);

impl StageSet {
    pub const fn empty() -> Self {
        StageSet(0)
    }

    pub fn map_only() -> Self {
        StageSet::empty().with(Stage::Map)
    }

    pub fn all() -> Self {
        Stage::ALL.into_iter().collect()
    }

    pub fn with(mut self, stage: Stage) -> Self {
        self.0 |= stage.bit();
        self
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// REDUCE necesita MAP. Sin MAP (vacío o sólo COMBINE) no corre ningún job
    /// y se lee una salida previa.
    pub fn validate(&self) -> Result<(), Stage> {
        if self.contains(Stage::Reduce) && !self.contains(Stage::Map) {
            return Err(Stage::Reduce);
        }
        Ok(())
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        iter.into_iter().fold(StageSet::empty(), StageSet::with)
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
