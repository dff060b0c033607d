use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hierarchy::{UnitId, UnitKind};
use crate::sink::SinkError;
use crate::store::StoreError;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum LabflowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Status phrase not found: {category}/{id}")]
    PhraseNotFound { category: String, id: String },

    #[error("{kind} {id} not found in store")]
    RootNotFound { kind: UnitKind, id: UnitId },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Commit failed, no promotions applied: {0}")]
    StoreCommit(#[source] StoreError),

    #[error("Export sink error: {0}")]
    SinkWrite(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A missing link in the hierarchy. Recovered locally: the affected
/// candidate or row is skipped and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("{kind} {id} is referenced but missing")]
    MissingUnit { kind: UnitKind, id: UnitId },

    #[error("{kind} {id} has no parent reference")]
    MissingParent { kind: UnitKind, id: UnitId },
}
