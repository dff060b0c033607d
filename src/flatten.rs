//! Flattens a root selection into one export row per result.
//!
//! Expansion is lazy and depth-first in child order: a job yields the results of
//! its first sample's first test before anything else is looked up. A result
//! whose chain to its sample cannot be followed is skipped and recorded in
//! [`FlattenStats`]; it is never emitted with placeholder fields.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ResolutionError;
use crate::hierarchy::resolve::{self, LookupError};
use crate::hierarchy::{RootSelection, Test, UnitId, UnitKind};
use crate::store::{RecordStore, StoreError};

/// One flattened result with its fully resolved ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub sample_ref: UnitId,
    /// The test's analysis identity.
    pub test_ref: String,
    pub component_name: String,
    pub result_text: String,
}

impl ExportRow {
    pub fn fields(&self) -> [&str; 4] {
        [
            self.sample_ref.as_str(),
            &self.test_ref,
            &self.component_name,
            &self.result_text,
        ]
    }
}

/// A unit that was dropped during expansion, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub kind: UnitKind,
    pub id: UnitId,
    pub error: ResolutionError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenStats {
    pub rows: usize,
    pub skipped: Vec<SkippedRow>,
}

pub struct Flattener<'s, S: RecordStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: RecordStore + ?Sized> Flattener<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Start expanding `selection`. Nothing is read from the store until the
    /// returned iterator is advanced.
    pub fn flatten(&self, selection: RootSelection) -> Rows<'s, S> {
        let mut queue = VecDeque::new();
        match selection {
            RootSelection::Jobs(jobs) => {
                for job in jobs {
                    queue.extend(job.samples.into_iter().map(Pending::Sample));
                }
            }
            RootSelection::Samples(samples) => {
                for sample in samples {
                    queue.extend(sample.tests.into_iter().map(Pending::Test));
                }
            }
            RootSelection::Tests(tests) => {
                for test in tests {
                    queue.extend(test.results.into_iter().map(Pending::Result));
                }
            }
            RootSelection::Empty => {}
        }

        Rows {
            store: self.store,
            queue,
            stats: FlattenStats::default(),
            error: None,
        }
    }
}

#[derive(Debug)]
enum Pending {
    Sample(UnitId),
    Test(UnitId),
    Result(UnitId),
}

impl Pending {
    fn key(&self) -> (UnitKind, &UnitId) {
        match self {
            Pending::Sample(id) => (UnitKind::Sample, id),
            Pending::Test(id) => (UnitKind::Test, id),
            Pending::Result(id) => (UnitKind::Result, id),
        }
    }
}

/// Single-pass, finite sequence of [`ExportRow`]s.
///
/// A store failure ends the sequence early; call [`Rows::finish`] afterwards to
/// tell a complete run from an aborted one.
pub struct Rows<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    queue: VecDeque<Pending>,
    stats: FlattenStats,
    error: Option<StoreError>,
}

impl<'s, S: RecordStore + ?Sized> Rows<'s, S> {
    pub fn stats(&self) -> &FlattenStats {
        &self.stats
    }

    /// Consumes the iterator, returning the stats or the store error that ended it.
    pub fn finish(self) -> Result<FlattenStats, StoreError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.stats),
        }
    }

    fn step(&mut self, pending: &Pending) -> Result<Option<ExportRow>, LookupError> {
        match pending {
            Pending::Sample(id) => {
                let sample = resolve::sample(self.store, id)?;
                self.push_front(sample.tests.into_iter().map(Pending::Test));
                Ok(None)
            }
            Pending::Test(id) => {
                let test = resolve::test(self.store, id)?;
                self.push_results(test);
                Ok(None)
            }
            Pending::Result(id) => {
                let result = resolve::result(self.store, id)?;
                let (sample, test) = resolve::ancestry(self.store, &result)?;
                Ok(Some(ExportRow {
                    sample_ref: sample.id,
                    test_ref: test.analysis,
                    component_name: result.component,
                    result_text: result.text,
                }))
            }
        }
    }

    fn push_results(&mut self, test: Test) {
        self.push_front(test.results.into_iter().map(Pending::Result));
    }

    // Children go ahead of everything already queued, keeping their own order.
    fn push_front(&mut self, children: impl DoubleEndedIterator<Item = Pending>) {
        for child in children.rev() {
            self.queue.push_front(child);
        }
    }
}

impl<'s, S: RecordStore + ?Sized> Iterator for Rows<'s, S> {
    type Item = ExportRow;

    fn next(&mut self) -> Option<ExportRow> {
        while let Some(pending) = self.queue.pop_front() {
            match self.step(&pending) {
                Ok(Some(row)) => {
                    self.stats.rows += 1;
                    return Some(row);
                }
                Ok(None) => {}
                Err(LookupError::Broken(error)) => {
                    let (kind, id) = pending.key();
                    debug!(%kind, %id, %error, "skipping unresolvable unit");
                    self.stats.skipped.push(SkippedRow {
                        kind,
                        id: id.clone(),
                        error,
                    });
                }
                Err(LookupError::Store(err)) => {
                    self.queue.clear();
                    self.error = Some(err);
                    return None;
                }
            }
        }
        None
    }
}

impl<'s, S: RecordStore + ?Sized> FusedIterator for Rows<'s, S> {}
