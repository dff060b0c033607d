//! Billing status rollup and result export over a JOB → SAMPLE → TEST → RESULT
//! record hierarchy.
//!
//! Two independent batch pipelines share one [`RecordStore`]:
//!
//! - [`StatusRollup`] promotes pending jobs to billed once every test under them is billed.
//! - [`Flattener`] + [`ExportWriter`] turn a root selection into CSV rows in a fresh target.
//!
//! [`BatchRunner`] wires both to configuration and produces a [`RunRecord`] per run.

pub mod cli;
pub mod config;
pub mod error;
pub mod flatten;
pub mod hierarchy;
pub mod orchestrator;
pub mod rollup;
pub mod sink;
pub mod store;
pub mod ui;

pub use config::LabflowConfig;
pub use error::{LabflowError, ResolutionError};
pub use flatten::{ExportRow, FlattenStats, Flattener, Rows, SkippedRow};
pub use hierarchy::{Job, ResultRecord, RootSelection, Sample, Test, Unit, UnitId, UnitKind};
pub use orchestrator::{BatchRunner, RunKind, RunRecord, RunStatus, StoreStatus};
pub use rollup::{
    CandidateOutcome, CandidateResult, EmptyJobPolicy, RollupOptions, RollupReport,
    RollupSettings, StatusRollup,
};
pub use sink::{EXPORT_HEADER, ExportReport, ExportSink, ExportTarget, ExportWriter, FsSink, SinkError};
pub use store::{MemoryStore, Mutation, Phrase, Predicate, Query, RecordStore, StoreError};
