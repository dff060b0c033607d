use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::LabflowConfig;
use crate::error::LabflowError;
use crate::flatten::{Flattener, SkippedRow};
use crate::hierarchy::{RootSelection, Unit, UnitId, UnitKind};
use crate::rollup::{CandidateResult, RollupOptions, StatusRollup};
use crate::sink::{ExportReport, ExportSink, ExportWriter, FsSink};
use crate::store::{Predicate, Query, RecordStore};

/// Job counts per state and the jobs a rollup would evaluate right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub jobs_by_state: BTreeMap<String, usize>,
    pub candidates: Vec<UnitId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Rollup,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Summary of one pipeline run: counts plus a terminal success/failure signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub status: RunStatus,
    pub promoted: usize,
    pub held: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub target: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rows: Vec<SkippedRow>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunRecord {
    fn begin(kind: RunKind) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            kind,
            status: RunStatus::Succeeded,
            promoted: 0,
            held: 0,
            skipped: 0,
            rows_written: 0,
            target: None,
            error: None,
            candidates: Vec::new(),
            skipped_rows: Vec::new(),
            dry_run: false,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    fn fail(&mut self, err: &LabflowError) {
        error!(run_id = %self.run_id, kind = ?self.kind, %err, "run failed");
        self.status = RunStatus::Failed;
        self.error = Some(err.to_string());
    }

    fn close(mut self) -> Self {
        self.completed_at = Utc::now();
        self.duration_ms = (self.completed_at - self.started_at).num_milliseconds();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Runs the two pipelines end to end and turns their outcome into a [`RunRecord`].
///
/// Failures never escape as `Err`; they end up in the record so the caller
/// always gets a summary to print.
pub struct BatchRunner {
    config: LabflowConfig,
}

impl BatchRunner {
    pub fn new(config: LabflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LabflowConfig {
        &self.config
    }

    pub fn status<S>(&self, store: &S) -> Result<StoreStatus, LabflowError>
    where
        S: RecordStore + ?Sized,
    {
        let mut status = StoreStatus::default();
        for job in store.query(&Query::new(UnitKind::Job))? {
            let state = job.state().unwrap_or("(none)").to_string();
            *status.jobs_by_state.entry(state).or_insert(0) += 1;
        }

        let pending = Query::new(UnitKind::Job)
            .filter(Predicate::equals("state", self.config.pending_status.as_str()));
        status.candidates = store
            .query(&pending)?
            .iter()
            .map(Unit::id)
            .cloned()
            .collect();
        Ok(status)
    }

    pub fn rollup<S>(&self, store: &mut S, options: RollupOptions) -> RunRecord
    where
        S: RecordStore + ?Sized,
    {
        let mut record = RunRecord::begin(RunKind::Rollup);
        record.dry_run = options.dry_run;

        let result = StatusRollup::new(store, self.config.rollup_settings())
            .with_options(options)
            .rollup();
        match result {
            Ok(report) => {
                record.run_id = report.run_id;
                record.promoted = report.promoted();
                record.held = report.held();
                record.skipped = report.skipped();
                record.candidates = report.candidates;
            }
            Err(err) => record.fail(&err),
        }
        record.close()
    }

    /// Flattens `selection` and writes it through `writer`.
    pub fn export<S, K>(
        &self,
        store: &S,
        selection: RootSelection,
        writer: &mut ExportWriter<K>,
    ) -> RunRecord
    where
        S: RecordStore + ?Sized,
        K: ExportSink,
    {
        let mut record = RunRecord::begin(RunKind::Export);
        info!(run_id = %record.run_id, roots = selection.len(), kind = ?selection.kind(), "starting export");

        let mut rows = Flattener::new(store).flatten(selection);
        let written = writer.write(rows.by_ref());
        let stats = rows.finish();

        match written {
            Ok(ExportReport {
                target,
                rows_written,
            }) => {
                record.target = Some(target.to_string());
                record.rows_written = rows_written;
            }
            Err(err) => {
                record.fail(&err);
                return record.close();
            }
        }

        match stats {
            Ok(stats) => {
                record.skipped = stats.skipped.len();
                record.skipped_rows = stats.skipped;
            }
            // The target holds a partial export; the run still counts as failed.
            Err(err) => record.fail(&LabflowError::Store(err)),
        }
        record.close()
    }

    /// [`export`](Self::export) into the configured directory, or `out_dir` when given.
    pub fn export_to_dir<S>(
        &self,
        store: &S,
        selection: RootSelection,
        out_dir: Option<&Path>,
    ) -> RunRecord
    where
        S: RecordStore + ?Sized,
    {
        let root = out_dir.unwrap_or(self.config.export_dir.as_path());
        let mut writer = ExportWriter::new(
            FsSink::new(root),
            self.config.export_key.clone(),
            self.config.export_extension.clone(),
        );
        self.export(store, selection, &mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn state(store: &MemoryStore, job: &str) -> Option<String> {
        store
            .get(UnitKind::Job, &job.into())
            .unwrap()
            .and_then(|u| u.state().map(str::to_string))
    }

    fn runner(export_dir: &Path) -> BatchRunner {
        BatchRunner::new(LabflowConfig {
            export_dir: export_dir.to_path_buf(),
            ..LabflowConfig::default()
        })
    }

    fn billing_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_phrase("BILLING_STATUS", "BILLED", "Billed");
        store.add_phrase("BILLING_STATUS", "PENDING", "Pending re-evaluation");
        store
    }

    #[test]
    fn rollup_waits_for_every_test_then_promotes() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J1", Some("PENDING")).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_sample("J1", "S2").unwrap();
        store.add_test("S1", "T1", "PH", Some("BILLED")).unwrap();
        store.add_test("S2", "T2", "COND", Some("PENDING")).unwrap();

        let first = runner.rollup(&mut store, RollupOptions::default());
        assert!(first.is_success());
        assert_eq!(first.promoted, 0);
        assert_eq!(first.held, 1);
        assert_eq!(state(&store, "J1").as_deref(), Some("PENDING"));

        store
            .set_state(UnitKind::Test, &UnitId::from("T2"), "BILLED")
            .unwrap();

        let second = runner.rollup(&mut store, RollupOptions::default());
        assert!(second.is_success());
        assert_eq!(second.promoted, 1);
        assert_eq!(state(&store, "J1").as_deref(), Some("BILLED"));
    }

    #[test]
    fn single_result_job_exports_one_line() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J2", Some("PENDING")).unwrap();
        store.add_sample("J2", "S3").unwrap();
        store.add_test("S3", "T3", "PH-METER", None).unwrap();
        store.add_result("T3", "R1", "pH", "7.0").unwrap();

        let selection =
            RootSelection::fetch(&store, UnitKind::Job, &[UnitId::from("J2")]).unwrap();
        let record = runner.export_to_dir(&store, selection, None);

        assert!(record.is_success(), "{:?}", record.error);
        assert_eq!(record.rows_written, 1);
        assert_eq!(record.skipped, 0);

        let target = record.target.unwrap();
        let text = std::fs::read_to_string(tmp.path().join(&target)).unwrap();
        assert_eq!(
            text,
            "SampleCode,TestCode,ComponentName,Result\nS3,PH-METER,pH,7.0\n"
        );
    }

    #[test]
    fn repeated_exports_land_in_distinct_targets() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J1", None).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_test("S1", "T1", "PH", None).unwrap();
        store.add_result("T1", "R1", "pH", "7.0").unwrap();
        store.add_result("T1", "R2", "temp", "20.1").unwrap();

        let select = || RootSelection::fetch(&store, UnitKind::Job, &[UnitId::from("J1")]).unwrap();
        let first = runner.export_to_dir(&store, select(), None);
        let second = runner.export_to_dir(&store, select(), None);

        let first_target = first.target.unwrap();
        let second_target = second.target.unwrap();
        assert_ne!(first_target, second_target);

        let first_text = std::fs::read_to_string(tmp.path().join(first_target)).unwrap();
        let second_text = std::fs::read_to_string(tmp.path().join(second_target)).unwrap();
        assert_eq!(first_text, second_text);
        assert_eq!(first_text.lines().count(), 3);
    }

    #[test]
    fn export_counts_skipped_results() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J1", None).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_test("S1", "T1", "PH", None).unwrap();
        store.add_result("T1", "R1", "pH", "7.0").unwrap();
        store.add_result("T1", "R2", "temp", "20.1").unwrap();
        store.remove(UnitKind::Result, &UnitId::from("R2"));

        let selection =
            RootSelection::fetch(&store, UnitKind::Sample, &[UnitId::from("S1")]).unwrap();
        let record = runner.export_to_dir(&store, selection, None);

        assert!(record.is_success());
        assert_eq!(record.rows_written, 1);
        assert_eq!(record.skipped, 1);
        assert_eq!(record.skipped_rows[0].id.as_str(), "R2");
    }

    #[test]
    fn out_dir_overrides_config() {
        let configured = TempDir::new().unwrap();
        let explicit = TempDir::new().unwrap();
        let runner = runner(configured.path());
        let store = billing_store();

        let record = runner.export_to_dir(&store, RootSelection::Empty, Some(explicit.path()));
        assert!(record.is_success());
        assert_eq!(record.rows_written, 0);
        assert!(explicit.path().join(record.target.unwrap()).exists());
    }

    #[test]
    fn commit_failure_is_reported_as_failed_run() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J1", Some("PENDING")).unwrap();
        store.add_sample("J1", "S1").unwrap();
        store.add_test("S1", "T1", "PH", Some("BILLED")).unwrap();
        store.reject_commits("lock timeout");

        let record = runner.rollup(&mut store, RollupOptions::default());

        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.promoted, 0);
        assert!(record.error.unwrap().contains("lock timeout"));
        assert_eq!(state(&store, "J1").as_deref(), Some("PENDING"));
    }

    #[test]
    fn status_counts_jobs_per_state() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();
        store.add_job("J1", Some("PENDING")).unwrap();
        store.add_job("J2", Some("BILLED")).unwrap();
        store.add_job("J3", Some("PENDING")).unwrap();
        store.add_job("J4", None).unwrap();

        let status = runner.status(&store).unwrap();
        assert_eq!(status.jobs_by_state["PENDING"], 2);
        assert_eq!(status.jobs_by_state["BILLED"], 1);
        assert_eq!(status.jobs_by_state["(none)"], 1);
        assert_eq!(status.candidates, vec![UnitId::from("J1"), UnitId::from("J3")]);
    }

    #[test]
    fn run_record_serializes_summary() {
        let tmp = TempDir::new().unwrap();
        let runner = runner(tmp.path());
        let mut store = billing_store();

        let record = runner.rollup(&mut store, RollupOptions { dry_run: true });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "rollup");
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["dry_run"], true);
        assert!(json.get("candidates").is_none());
        assert!(record.duration_ms >= 0);
    }
}
