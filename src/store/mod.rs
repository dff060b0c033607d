//! The record store seam.
//!
//! [`RecordStore`] is the narrow contract both pipelines consume: filtered,
//! ordered selection of units, point lookups, staged mutations applied by a
//! single atomic [`commit`](RecordStore::commit), and phrase lookup for status
//! values. [`MemoryStore`] is the in-process implementation used by the CLI
//! (backed by a JSON snapshot) and by tests.

mod memory;
mod query;

pub use memory::{MemoryStore, Snapshot};
pub use query::{Direction, OrderBy, Predicate, Query};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hierarchy::{Unit, UnitId, UnitKind};

/// A fixed enumerated reference value, e.g. a billing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub category: String,
    pub id: String,
    #[serde(default)]
    pub text: String,
}

/// A pending write, applied only on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    SetState {
        kind: UnitKind,
        id: UnitId,
        state: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown field `{field}` on {kind}")]
    UnknownField { kind: UnitKind, field: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: UnitKind, id: UnitId },

    #[error("{kind} {id} carries no state")]
    Stateless { kind: UnitKind, id: UnitId },

    #[error("commit rejected: {0}")]
    CommitRejected(String),

    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

pub trait RecordStore {
    /// Returns every unit matching the query, in query order (insertion order when unordered).
    fn query(&self, query: &Query) -> Result<Vec<Unit>, StoreError>;

    fn get(&self, kind: UnitKind, id: &UnitId) -> Result<Option<Unit>, StoreError>;

    /// Queues a mutation. Nothing is visible until [`commit`](RecordStore::commit).
    fn stage(&mut self, mutation: Mutation) -> Result<(), StoreError>;

    /// Applies every staged mutation atomically, returning how many were applied.
    /// On error nothing is applied and the staged set is discarded.
    fn commit(&mut self) -> Result<usize, StoreError>;

    /// Discards every staged mutation without applying any.
    fn rollback(&mut self);

    fn select_phrase(&self, category: &str, id: &str) -> Result<Option<Phrase>, StoreError>;
}
