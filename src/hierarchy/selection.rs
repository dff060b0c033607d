use tracing::warn;

use crate::error::LabflowError;
use crate::hierarchy::{Job, Sample, Test, Unit, UnitId, UnitKind};
use crate::store::RecordStore;

/// The roots handed to the flattener, one kind per selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RootSelection {
    Jobs(Vec<Job>),
    Samples(Vec<Sample>),
    Tests(Vec<Test>),
    #[default]
    Empty,
}

impl RootSelection {
    /// Classifies a list of units once, at the boundary.
    ///
    /// Empty, mixed, or result-only lists become [`RootSelection::Empty`].
    pub fn from_units(units: Vec<Unit>) -> Self {
        let Some(first) = units.first().map(Unit::kind) else {
            return RootSelection::Empty;
        };
        if units.iter().any(|u| u.kind() != first) {
            warn!(roots = units.len(), "mixed root selection, nothing to flatten");
            return RootSelection::Empty;
        }

        match first {
            UnitKind::Job => RootSelection::Jobs(
                units
                    .into_iter()
                    .filter_map(|u| match u {
                        Unit::Job(job) => Some(job),
                        _ => None,
                    })
                    .collect(),
            ),
            UnitKind::Sample => RootSelection::Samples(
                units
                    .into_iter()
                    .filter_map(|u| match u {
                        Unit::Sample(sample) => Some(sample),
                        _ => None,
                    })
                    .collect(),
            ),
            UnitKind::Test => RootSelection::Tests(
                units
                    .into_iter()
                    .filter_map(|u| match u {
                        Unit::Test(test) => Some(test),
                        _ => None,
                    })
                    .collect(),
            ),
            UnitKind::Result => {
                warn!(roots = units.len(), "results are not a valid root selection");
                RootSelection::Empty
            }
        }
    }

    /// Looks up the given ids of one kind. Unknown ids are an error.
    pub fn fetch<S>(store: &S, kind: UnitKind, ids: &[UnitId]) -> Result<Self, LabflowError>
    where
        S: RecordStore + ?Sized,
    {
        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            let unit = store
                .get(kind, id)?
                .ok_or_else(|| LabflowError::RootNotFound {
                    kind,
                    id: id.clone(),
                })?;
            units.push(unit);
        }
        Ok(Self::from_units(units))
    }

    pub fn kind(&self) -> Option<UnitKind> {
        match self {
            RootSelection::Jobs(_) => Some(UnitKind::Job),
            RootSelection::Samples(_) => Some(UnitKind::Sample),
            RootSelection::Tests(_) => Some(UnitKind::Test),
            RootSelection::Empty => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RootSelection::Jobs(jobs) => jobs.len(),
            RootSelection::Samples(samples) => samples.len(),
            RootSelection::Tests(tests) => tests.len(),
            RootSelection::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
