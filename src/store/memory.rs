use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Mutation, Phrase, Query, RecordStore, StoreError};
use crate::error::LabflowError;
use crate::hierarchy::{Job, ResultRecord, Sample, Test, Unit, UnitId, UnitKind};

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub phrases: Vec<Phrase>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

/// In-process record store. Units are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    units: Vec<Unit>,
    index: HashMap<(UnitKind, UnitId), usize>,
    phrases: Vec<Phrase>,
    staged: Vec<Mutation>,
    reject_reason: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        let mut store = Self {
            phrases: snapshot.phrases,
            ..Self::default()
        };
        for unit in snapshot.units {
            store.insert(unit)?;
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phrases: self.phrases.clone(),
            units: self.units.clone(),
        }
    }

    /// Loads a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, LabflowError> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot)?)
    }

    /// Writes the committed state as a JSON snapshot. Staged mutations are not included.
    pub fn save(&self, path: &Path) -> Result<(), LabflowError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Inserts a unit as-is, without touching parent or child links.
    pub fn insert(&mut self, unit: Unit) -> Result<(), StoreError> {
        let key = (unit.kind(), unit.id().clone());
        if self.index.contains_key(&key) {
            return Err(StoreError::Inconsistent(format!(
                "duplicate {} {}",
                key.0, key.1
            )));
        }
        self.index.insert(key, self.units.len());
        self.units.push(unit);
        Ok(())
    }

    /// Removes a unit, leaving any references to it dangling.
    pub fn remove(&mut self, kind: UnitKind, id: &UnitId) -> Option<Unit> {
        let pos = self.index.remove(&(kind, id.clone()))?;
        let unit = self.units.remove(pos);
        self.reindex();
        Some(unit)
    }

    pub fn add_phrase(&mut self, category: &str, id: &str, text: &str) {
        self.phrases.push(Phrase {
            category: category.to_string(),
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    pub fn add_job(&mut self, id: &str, state: Option<&str>) -> Result<(), StoreError> {
        self.insert(Unit::Job(Job {
            id: id.into(),
            state: state.map(str::to_string),
            samples: Vec::new(),
        }))
    }

    /// Adds a sample and appends it to the job's children when the job exists.
    pub fn add_sample(&mut self, job: &str, id: &str) -> Result<(), StoreError> {
        self.insert(Unit::Sample(Sample {
            id: id.into(),
            job: Some(job.into()),
            state: None,
            tests: Vec::new(),
        }))?;
        self.link(UnitKind::Job, job, id);
        Ok(())
    }

    pub fn add_test(
        &mut self,
        sample: &str,
        id: &str,
        analysis: &str,
        state: Option<&str>,
    ) -> Result<(), StoreError> {
        self.insert(Unit::Test(Test {
            id: id.into(),
            sample: Some(sample.into()),
            analysis: analysis.to_string(),
            state: state.map(str::to_string),
            results: Vec::new(),
        }))?;
        self.link(UnitKind::Sample, sample, id);
        Ok(())
    }

    pub fn add_result(
        &mut self,
        test: &str,
        id: &str,
        component: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        self.insert(Unit::Result(ResultRecord {
            id: id.into(),
            test: Some(test.into()),
            component: component.to_string(),
            text: text.to_string(),
        }))?;
        self.link(UnitKind::Test, test, id);
        Ok(())
    }

    /// Changes a unit's state immediately, bypassing staging.
    pub fn set_state(&mut self, kind: UnitKind, id: &UnitId, state: &str) -> Result<(), StoreError> {
        let pos = self.position(kind, id)?;
        if self.units[pos].set_state(state.to_string()) {
            Ok(())
        } else {
            Err(StoreError::Stateless {
                kind,
                id: id.clone(),
            })
        }
    }

    /// Makes every subsequent commit fail with the given reason.
    pub fn reject_commits(&mut self, reason: impl Into<String>) {
        self.reject_reason = Some(reason.into());
    }

    pub fn staged(&self) -> &[Mutation] {
        &self.staged
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    fn link(&mut self, parent_kind: UnitKind, parent: &str, child: &str) {
        if let Some(&pos) = self.index.get(&(parent_kind, UnitId::from(parent))) {
            if let Some(children) = self.units[pos].children_mut() {
                children.push(child.into());
            }
        }
    }

    fn position(&self, kind: UnitKind, id: &UnitId) -> Result<usize, StoreError> {
        self.index
            .get(&(kind, id.clone()))
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.clone(),
            })
    }

    fn reindex(&mut self) {
        self.index = self
            .units
            .iter()
            .enumerate()
            .map(|(pos, unit)| ((unit.kind(), unit.id().clone()), pos))
            .collect();
    }
}

impl RecordStore for MemoryStore {
    fn query(&self, query: &Query) -> Result<Vec<Unit>, StoreError> {
        let mut selected = Vec::new();
        for unit in &self.units {
            if query.matches(unit)? {
                selected.push(unit.clone());
            }
        }
        query.sort(&mut selected)?;
        Ok(selected)
    }

    fn get(&self, kind: UnitKind, id: &UnitId) -> Result<Option<Unit>, StoreError> {
        Ok(self
            .index
            .get(&(kind, id.clone()))
            .map(|&pos| self.units[pos].clone()))
    }

    fn stage(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        self.staged.push(mutation);
        Ok(())
    }

    fn commit(&mut self) -> Result<usize, StoreError> {
        let staged = std::mem::take(&mut self.staged);

        if let Some(reason) = &self.reject_reason {
            return Err(StoreError::CommitRejected(reason.clone()));
        }

        // Validate everything before applying anything.
        let mut plan = Vec::with_capacity(staged.len());
        for mutation in &staged {
            match mutation {
                Mutation::SetState { kind, id, state } => {
                    let pos = self.position(*kind, id)?;
                    if *kind == UnitKind::Result {
                        return Err(StoreError::Stateless {
                            kind: *kind,
                            id: id.clone(),
                        });
                    }
                    plan.push((pos, state.clone()));
                }
            }
        }

        for (pos, state) in plan {
            self.units[pos].set_state(state);
        }
        Ok(staged.len())
    }

    fn rollback(&mut self) {
        self.staged.clear();
    }

    fn select_phrase(&self, category: &str, id: &str) -> Result<Option<Phrase>, StoreError> {
        Ok(self
            .phrases
            .iter()
            .find(|p| p.category == category && p.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, Predicate};
    use tempfile::TempDir;

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_phrase("BILLING_STATUS", "BILLED", "Billed");
        store.add_job("J1", Some("PENDING")).unwrap();
        store.add_job("J2", Some("BILLED")).unwrap();
        store.add_job("J3", Some("PENDING")).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_test("S1", "T1", "PH", Some("BILLED")).unwrap();
        store.add_result("T1", "R1", "pH", "7.0").unwrap();
        store
    }

    #[test]
    fn helpers_maintain_links() {
        let store = seeded();
        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.children(), &[UnitId::from("S1")]);

        let result = store.get(UnitKind::Result, &"R1".into()).unwrap().unwrap();
        assert_eq!(result.parent_ref(), Some(&UnitId::from("T1")));
    }

    #[test]
    fn ids_are_unique_per_kind_only() {
        let mut store = seeded();
        // Same id, different kind.
        store.add_sample("J2", "J1").unwrap();
        let err = store.add_job("J1", None).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn query_keeps_insertion_order() {
        let store = seeded();
        let pending = store
            .query(&Query::new(UnitKind::Job).filter(Predicate::equals("state", "PENDING")))
            .unwrap();
        let ids: Vec<_> = pending.iter().map(|u| u.id().as_str()).collect();
        assert_eq!(ids, vec!["J1", "J3"]);

        let ordered = store
            .query(&Query::new(UnitKind::Job).order_by("id", Direction::Descending))
            .unwrap();
        assert_eq!(ordered[0].id().as_str(), "J3");
    }

    #[test]
    fn staged_mutations_invisible_until_commit() {
        let mut store = seeded();
        store
            .stage(Mutation::SetState {
                kind: UnitKind::Job,
                id: "J1".into(),
                state: "BILLED".into(),
            })
            .unwrap();

        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.state(), Some("PENDING"));

        assert_eq!(store.commit().unwrap(), 1);
        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.state(), Some("BILLED"));
        assert!(store.staged().is_empty());
    }

    #[test]
    fn commit_is_all_or_nothing() {
        let mut store = seeded();
        store
            .stage(Mutation::SetState {
                kind: UnitKind::Job,
                id: "J1".into(),
                state: "BILLED".into(),
            })
            .unwrap();
        store
            .stage(Mutation::SetState {
                kind: UnitKind::Job,
                id: "MISSING".into(),
                state: "BILLED".into(),
            })
            .unwrap();

        let err = store.commit().unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.state(), Some("PENDING"));
        assert!(store.staged().is_empty());
    }

    #[test]
    fn rollback_discards_staged() {
        let mut store = seeded();
        store
            .stage(Mutation::SetState {
                kind: UnitKind::Job,
                id: "J1".into(),
                state: "BILLED".into(),
            })
            .unwrap();
        store.rollback();
        assert_eq!(store.commit().unwrap(), 0);
        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.state(), Some("PENDING"));
    }

    #[test]
    fn rejected_commit_applies_nothing() {
        let mut store = seeded();
        store.reject_commits("disk full");
        store
            .stage(Mutation::SetState {
                kind: UnitKind::Job,
                id: "J1".into(),
                state: "BILLED".into(),
            })
            .unwrap();

        let err = store.commit().unwrap_err();
        assert_eq!(err.to_string(), "commit rejected: disk full");
        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.state(), Some("PENDING"));
    }

    #[test]
    fn remove_leaves_dangling_reference() {
        let mut store = seeded();
        store.remove(UnitKind::Sample, &"S1".into()).unwrap();

        let job = store.get(UnitKind::Job, &"J1".into()).unwrap().unwrap();
        assert_eq!(job.children(), &[UnitId::from("S1")]);
        assert!(store.get(UnitKind::Sample, &"S1".into()).unwrap().is_none());
        // Index still resolves units stored after the removed one.
        assert!(store.get(UnitKind::Result, &"R1".into()).unwrap().is_some());
    }

    #[test]
    fn select_phrase_matches_category_and_id() {
        let store = seeded();
        assert!(store.select_phrase("BILLING_STATUS", "BILLED").unwrap().is_some());
        assert!(store.select_phrase("OTHER", "BILLED").unwrap().is_none());
    }

    #[test]
    fn snapshot_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");

        let store = seeded();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert!(loaded.get(UnitKind::Test, &"T1".into()).unwrap().is_some());
    }
}
