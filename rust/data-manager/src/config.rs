use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DataManagerError;

/// How the [DataManager](crate::DataManager) picks an owner when more than
/// one registered [DedicatedStorage](crate::DedicatedStorage) is able to store
/// the same key. Either way the choice is memoized, so it only matters the
/// first time a key is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// The candidate that was registered earliest wins
    #[default]
    FirstRegistered,
    /// The candidate that was registered most recently wins
    LastRegistered,
}

impl TieBreak {
    /// Select one of the candidates, which are expected in registration
    /// order. Only `None` when there is no candidate at all.
    pub fn select<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        match self {
            TieBreak::FirstRegistered => candidates.first(),
            TieBreak::LastRegistered => candidates.last(),
        }
    }
}

impl FromStr for TieBreak {
    type Err = DataManagerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "first-registered" => Ok(TieBreak::FirstRegistered),
            "last-registered" => Ok(TieBreak::LastRegistered),
            other => Err(DataManagerError::Configuration(format!(
                "Unknown tie-break strategy '{other}'"
            ))),
        }
    }
}

impl Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TieBreak::FirstRegistered => write!(f, "first-registered"),
            TieBreak::LastRegistered => write!(f, "last-registered"),
        }
    }
}

/// Configuration for a [DataManager](crate::DataManager)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DataManagerConfig {
    /// Strategy used to pick an owner among several eligible storages
    pub tie_break: TieBreak,

    /// Whether [DataManager::register](crate::DataManager::register) and
    /// [DataManager::deregister](crate::DataManager::deregister) reprocess the
    /// data already known to the manager
    pub reprocess_by_default: bool,
}

impl Default for DataManagerConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::FirstRegistered,
            reprocess_by_default: true,
        }
    }
}

impl DataManagerConfig {
    /// Use the given [TieBreak] strategy
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Set the reprocessing behavior of the convenience registration methods
    pub fn with_reprocess_by_default(mut self, reprocess: bool) -> Self {
        self.reprocess_by_default = reprocess;
        self
    }
}
