//! Billing status rollup: JOB ← SAMPLE ← TEST.
//!
//! A job waiting for re-evaluation is promoted to billed only when every test
//! under every one of its samples is already billed. Promotions are staged
//! while candidates are evaluated and committed together at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LabflowError, ResolutionError};
use crate::hierarchy::resolve::{self, LookupError};
use crate::hierarchy::{Job, Unit, UnitId, UnitKind};
use crate::store::{Mutation, Predicate, Query, RecordStore, StoreError};

/// How a job with no tests at all is treated.
///
/// `all()` over an empty set is true, so `Promote` bills empty jobs; `Hold`
/// leaves them pending until a test appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyJobPolicy {
    #[default]
    Hold,
    Promote,
}

/// Status values and policy for one rollup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupSettings {
    pub status_category: String,
    pub pending_status: String,
    pub billed_status: String,
    pub empty_jobs: EmptyJobPolicy,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            status_category: "BILLING_STATUS".to_string(),
            pending_status: "PENDING".to_string(),
            billed_status: "BILLED".to_string(),
            empty_jobs: EmptyJobPolicy::Hold,
        }
    }
}

/// What happened to a single candidate job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// Every test billed (or the job is empty under `Promote`).
    Promoted,
    /// At least one test is not billed; the first one found is recorded.
    Held { first_unbilled: UnitId },
    /// No tests under the job and the policy is `Hold`.
    HeldEmpty,
    /// The job's descendants could not be resolved.
    Skipped { error: ResolutionError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub job: UnitId,
    pub tests: usize,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Summary of one rollup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub candidates: Vec<CandidateResult>,
    /// Mutations applied by the final commit. Zero on a dry run.
    pub committed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RollupReport {
    pub fn promoted(&self) -> usize {
        self.count(|o| matches!(o, CandidateOutcome::Promoted))
    }

    pub fn held(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                CandidateOutcome::Held { .. } | CandidateOutcome::HeldEmpty
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CandidateOutcome::Skipped { .. }))
    }

    pub fn promoted_jobs(&self) -> Vec<&UnitId> {
        self.candidates
            .iter()
            .filter(|c| c.outcome == CandidateOutcome::Promoted)
            .map(|c| &c.job)
            .collect()
    }

    fn count(&self, pred: impl Fn(&CandidateOutcome) -> bool) -> usize {
        self.candidates.iter().filter(|c| pred(&c.outcome)).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RollupOptions {
    /// Evaluate and report without staging or committing anything.
    pub dry_run: bool,
}

/// Drives one rollup run against a record store.
pub struct StatusRollup<'s, S: RecordStore + ?Sized> {
    store: &'s mut S,
    settings: RollupSettings,
    options: RollupOptions,
}

impl<'s, S: RecordStore + ?Sized> StatusRollup<'s, S> {
    pub fn new(store: &'s mut S, settings: RollupSettings) -> Self {
        Self {
            store,
            settings,
            options: RollupOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RollupOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate every pending job and commit the promotions as one batch.
    ///
    /// Broken hierarchies skip only the affected job. A store failure, including
    /// a failed commit, aborts the run with nothing applied.
    pub fn rollup(&mut self) -> Result<RollupReport, LabflowError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let dry_run = self.options.dry_run;
        info!(%run_id, dry_run, pending = %self.settings.pending_status, "starting billing rollup");

        let billed = self
            .store
            .select_phrase(&self.settings.status_category, &self.settings.billed_status)?
            .ok_or_else(|| LabflowError::PhraseNotFound {
                category: self.settings.status_category.clone(),
                id: self.settings.billed_status.clone(),
            })?;

        // Point-in-time snapshot; jobs changing after this read are not re-checked.
        let query = Query::new(UnitKind::Job)
            .filter(Predicate::equals("state", self.settings.pending_status.as_str()));
        let snapshot = self.store.query(&query)?;
        debug!(candidates = snapshot.len(), "candidate jobs selected");

        let (candidates, staged) = match self.evaluate_snapshot(snapshot, &billed.id, dry_run) {
            Ok(evaluated) => evaluated,
            Err(err) => {
                // Nothing from an aborted run may reach a later commit.
                self.store.rollback();
                warn!(%run_id, %err, "rollup aborted, staged promotions discarded");
                return Err(err);
            }
        };

        let committed = if staged == 0 {
            0
        } else {
            self.store.commit().map_err(|err| {
                warn!(%run_id, staged, %err, "commit failed, no jobs promoted");
                LabflowError::StoreCommit(err)
            })?
        };

        let report = RollupReport {
            run_id,
            dry_run,
            candidates,
            committed,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            %run_id,
            promoted = report.promoted(),
            held = report.held(),
            skipped = report.skipped(),
            "billing rollup finished"
        );
        Ok(report)
    }

    /// Evaluate each candidate in snapshot order, staging promotions as they qualify.
    /// Returns the per-job results and the number of staged mutations.
    fn evaluate_snapshot(
        &mut self,
        snapshot: Vec<Unit>,
        billed: &str,
        dry_run: bool,
    ) -> Result<(Vec<CandidateResult>, usize), LabflowError> {
        let mut candidates = Vec::with_capacity(snapshot.len());
        let mut staged = 0usize;
        for unit in snapshot {
            let job = match unit {
                Unit::Job(job) => job,
                other => {
                    return Err(StoreError::Inconsistent(format!(
                        "job query answered with {} {}",
                        other.kind(),
                        other.id()
                    ))
                    .into());
                }
            };

            let (tests, outcome) = self.evaluate(&job, billed)?;
            match &outcome {
                CandidateOutcome::Promoted => {
                    debug!(job = %job.id, tests, "all tests billed, promoting");
                    if !dry_run {
                        self.store.stage(Mutation::SetState {
                            kind: UnitKind::Job,
                            id: job.id.clone(),
                            state: billed.to_string(),
                        })?;
                        staged += 1;
                    }
                }
                CandidateOutcome::Held { first_unbilled } => {
                    debug!(job = %job.id, test = %first_unbilled, "unbilled test, holding");
                }
                CandidateOutcome::HeldEmpty => {
                    debug!(job = %job.id, "no tests, holding");
                }
                CandidateOutcome::Skipped { error } => {
                    warn!(job = %job.id, %error, "skipping candidate");
                }
            }
            candidates.push(CandidateResult {
                job: job.id,
                tests,
                outcome,
            });
        }
        Ok((candidates, staged))
    }

    /// Decide a single job. Returns the number of tests inspected with the outcome.
    fn evaluate(
        &self,
        job: &Job,
        billed: &str,
    ) -> Result<(usize, CandidateOutcome), LabflowError> {
        let tests = match resolve::job_tests(&*self.store, job) {
            Ok(tests) => tests,
            Err(LookupError::Broken(error)) => {
                return Ok((0, CandidateOutcome::Skipped { error }));
            }
            Err(LookupError::Store(err)) => return Err(err.into()),
        };

        if tests.is_empty() {
            let outcome = match self.settings.empty_jobs {
                EmptyJobPolicy::Promote => CandidateOutcome::Promoted,
                EmptyJobPolicy::Hold => CandidateOutcome::HeldEmpty,
            };
            return Ok((0, outcome));
        }

        let outcome = match tests.iter().find(|t| t.state.as_deref() != Some(billed)) {
            Some(unbilled) => CandidateOutcome::Held {
                first_unbilled: unbilled.id.clone(),
            },
            None => CandidateOutcome::Promoted,
        };
        Ok((tests.len(), outcome))
    }
}
