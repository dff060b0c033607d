use crate::error::ResolutionError;
use crate::hierarchy::{Job, ResultRecord, Sample, Test, Unit, UnitId, UnitKind};
use crate::store::{RecordStore, StoreError};

/// Why a link could not be followed.
///
/// `Broken` is a data problem local to one unit and is recovered by the caller;
/// `Store` means the store itself failed and aborts the run.
#[derive(Debug)]
pub(crate) enum LookupError {
    Broken(ResolutionError),
    Store(StoreError),
}

impl From<StoreError> for LookupError {
    fn from(err: StoreError) -> Self {
        LookupError::Store(err)
    }
}

impl From<ResolutionError> for LookupError {
    fn from(err: ResolutionError) -> Self {
        LookupError::Broken(err)
    }
}

fn fetch<S>(store: &S, kind: UnitKind, id: &UnitId) -> Result<Unit, LookupError>
where
    S: RecordStore + ?Sized,
{
    store.get(kind, id)?.ok_or_else(|| {
        LookupError::Broken(ResolutionError::MissingUnit {
            kind,
            id: id.clone(),
        })
    })
}

fn wrong_kind(expected: UnitKind, unit: &Unit) -> LookupError {
    LookupError::Store(StoreError::Inconsistent(format!(
        "asked for {expected} {}, got {}",
        unit.id(),
        unit.kind()
    )))
}

pub(crate) fn sample<S>(store: &S, id: &UnitId) -> Result<Sample, LookupError>
where
    S: RecordStore + ?Sized,
{
    match fetch(store, UnitKind::Sample, id)? {
        Unit::Sample(sample) => Ok(sample),
        other => Err(wrong_kind(UnitKind::Sample, &other)),
    }
}

pub(crate) fn test<S>(store: &S, id: &UnitId) -> Result<Test, LookupError>
where
    S: RecordStore + ?Sized,
{
    match fetch(store, UnitKind::Test, id)? {
        Unit::Test(test) => Ok(test),
        other => Err(wrong_kind(UnitKind::Test, &other)),
    }
}

pub(crate) fn result<S>(store: &S, id: &UnitId) -> Result<ResultRecord, LookupError>
where
    S: RecordStore + ?Sized,
{
    match fetch(store, UnitKind::Result, id)? {
        Unit::Result(result) => Ok(result),
        other => Err(wrong_kind(UnitKind::Result, &other)),
    }
}

/// Every test under every sample of the job, in child order.
pub(crate) fn job_tests<S>(store: &S, job: &Job) -> Result<Vec<Test>, LookupError>
where
    S: RecordStore + ?Sized,
{
    let mut tests = Vec::new();
    for sample_id in &job.samples {
        let sample = sample(store, sample_id)?;
        for test_id in &sample.tests {
            tests.push(test(store, test_id)?);
        }
    }
    Ok(tests)
}

/// Walks a result's parent references up to its sample.
pub(crate) fn ancestry<S>(store: &S, result: &ResultRecord) -> Result<(Sample, Test), LookupError>
where
    S: RecordStore + ?Sized,
{
    let test_id = result
        .test
        .as_ref()
        .ok_or_else(|| ResolutionError::MissingParent {
            kind: UnitKind::Result,
            id: result.id.clone(),
        })?;
    let test = test(store, test_id)?;

    let sample_id = test
        .sample
        .as_ref()
        .ok_or_else(|| ResolutionError::MissingParent {
            kind: UnitKind::Test,
            id: test.id.clone(),
        })?;
    let sample = sample(store, sample_id)?;

    Ok((sample, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_job("J1", Some("PENDING")).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_sample("J1", "S2").unwrap();
        store.add_test("S1", "T1", "PH", Some("BILLED")).unwrap();
        store.add_test("S2", "T2", "COND", None).unwrap();
        store.add_test("S2", "T3", "TURB", None).unwrap();
        store.add_result("T1", "R1", "pH", "7.0").unwrap();
        store
    }

    fn job(store: &MemoryStore, id: &str) -> Job {
        match store.get(UnitKind::Job, &id.into()).unwrap() {
            Some(Unit::Job(job)) => job,
            other => panic!("expected job, got {other:?}"),
        }
    }

    #[test]
    fn job_tests_in_child_order() {
        let store = store();
        let tests = job_tests(&store, &job(&store, "J1")).unwrap();
        let ids: Vec<_> = tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn dangling_child_is_broken_not_fatal() {
        let mut store = store();
        store.remove(UnitKind::Test, &"T2".into());

        let err = job_tests(&store, &job(&store, "J1")).unwrap_err();
        match err {
            LookupError::Broken(ResolutionError::MissingUnit { kind, id }) => {
                assert_eq!(kind, UnitKind::Test);
                assert_eq!(id.as_str(), "T2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ancestry_walks_to_sample() {
        let store = store();
        let result = result(&store, &"R1".into()).unwrap();
        let (sample, test) = ancestry(&store, &result).unwrap();
        assert_eq!(sample.id.as_str(), "S1");
        assert_eq!(test.analysis, "PH");
    }

    #[test]
    fn ancestry_reports_null_parent() {
        let store = store();
        let orphan = ResultRecord {
            id: "R9".into(),
            test: None,
            component: "pH".into(),
            text: "6.5".into(),
        };
        let err = ancestry(&store, &orphan).unwrap_err();
        assert!(matches!(
            err,
            LookupError::Broken(ResolutionError::MissingParent {
                kind: UnitKind::Result,
                ..
            })
        ));
    }
}
