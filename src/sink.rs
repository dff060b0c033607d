//! Append-only export targets.
//!
//! Every [`ExportWriter::write`] call gets a freshly named target from the
//! [`ExportSink`], so repeated or concurrent runs never touch each other's
//! output. The first line is always the fixed header, followed by one line per
//! row in the order received.

use std::borrow::Cow;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LabflowError;
use crate::flatten::ExportRow;

pub const EXPORT_HEADER: [&str; 4] = ["SampleCode", "TestCode", "ComponentName", "Result"];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create export target under {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("export target {0} already exists")]
    Exists(String),

    #[error("failed to append to {target}: {source}")]
    Append {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Handle to one freshly named output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportTarget {
    pub directory: String,
    pub name: String,
}

impl fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.directory, self.name)
    }
}

pub trait ExportSink {
    /// Creates a new, never-before-used target under `directory_key`.
    /// A name that already exists fails with [`SinkError::Exists`].
    fn create_unique_target(
        &mut self,
        directory_key: &str,
        extension_hint: &str,
    ) -> Result<ExportTarget, SinkError>;

    /// Appends one line to a target returned by `create_unique_target`.
    fn append_line(&mut self, target: &ExportTarget, text: &str) -> Result<(), SinkError>;
}

/// Random file name with the extension hint, if any.
pub fn unique_name(extension_hint: &str) -> String {
    let ext = extension_hint.trim_start_matches('.');
    if ext.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}.{ext}", Uuid::new_v4())
    }
}

/// Writes targets as files under `root/<directory_key>/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, target: &ExportTarget) -> PathBuf {
        self.root.join(&target.directory).join(&target.name)
    }

    // Creates the file exclusively; an existing name is an error.
    fn reserve(&self, directory_key: &str, name: String) -> Result<ExportTarget, SinkError> {
        let target = ExportTarget {
            directory: directory_key.to_string(),
            name,
        };
        let path = self.path_of(&target);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(target),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(SinkError::Exists(target.to_string()))
            }
            Err(source) => Err(SinkError::Create { path, source }),
        }
    }
}

impl ExportSink for FsSink {
    fn create_unique_target(
        &mut self,
        directory_key: &str,
        extension_hint: &str,
    ) -> Result<ExportTarget, SinkError> {
        let dir = self.root.join(directory_key);
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Create {
            path: dir.clone(),
            source,
        })?;

        self.reserve(directory_key, unique_name(extension_hint))
    }

    fn append_line(&mut self, target: &ExportTarget, text: &str) -> Result<(), SinkError> {
        let append_err = |source| SinkError::Append {
            target: target.to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.path_of(target))
            .map_err(append_err)?;
        writeln!(file, "{text}").map_err(append_err)
    }
}

/// Formats fields as one CSV line. Fields holding a comma, quote or line break
/// are quoted with inner quotes doubled; everything else is written verbatim.
pub fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub target: ExportTarget,
    pub rows_written: usize,
}

/// Writes flattened rows to a fresh target per call.
pub struct ExportWriter<K: ExportSink> {
    sink: K,
    directory_key: String,
    extension: String,
}

impl<K: ExportSink> ExportWriter<K> {
    pub fn new(sink: K, directory_key: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            sink,
            directory_key: directory_key.into(),
            extension: extension.into(),
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Writes the header and every row, in order, to a new target.
    ///
    /// Any sink failure aborts the write; rows already appended stay in that
    /// target but the run is reported as failed.
    pub fn write<I>(&mut self, rows: I) -> Result<ExportReport, LabflowError>
    where
        I: IntoIterator<Item = ExportRow>,
    {
        let target = self
            .sink
            .create_unique_target(&self.directory_key, &self.extension)?;
        debug!(%target, "export target created");

        self.sink.append_line(&target, &csv_line(&EXPORT_HEADER))?;
        let mut rows_written = 0usize;
        for row in rows {
            self.sink.append_line(&target, &csv_line(&row.fields()))?;
            rows_written += 1;
        }

        info!(%target, rows_written, "export written");
        Ok(ExportReport {
            target,
            rows_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn row(sample: &str, test: &str, component: &str, text: &str) -> ExportRow {
        ExportRow {
            sample_ref: sample.into(),
            test_ref: test.into(),
            component_name: component.into(),
            result_text: text.into(),
        }
    }

    /// Keeps lines in memory; can be told to fail after N appends.
    #[derive(Default)]
    struct MemorySink {
        files: HashMap<ExportTarget, Vec<String>>,
        fail_after: Option<usize>,
        appends: usize,
    }

    impl ExportSink for MemorySink {
        fn create_unique_target(
            &mut self,
            directory_key: &str,
            extension_hint: &str,
        ) -> Result<ExportTarget, SinkError> {
            Ok(ExportTarget {
                directory: directory_key.to_string(),
                name: unique_name(extension_hint),
            })
        }

        fn append_line(&mut self, target: &ExportTarget, text: &str) -> Result<(), SinkError> {
            if self.fail_after.is_some_and(|n| self.appends >= n) {
                return Err(SinkError::Append {
                    target: target.to_string(),
                    source: io::Error::other("quota exceeded"),
                });
            }
            self.appends += 1;
            self.files
                .entry(target.clone())
                .or_default()
                .push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn csv_line_plain_fields_verbatim() {
        assert_eq!(csv_line(&["S3", "PH", "pH", "7.0"]), "S3,PH,pH,7.0");
    }

    #[test]
    fn csv_line_quotes_special_fields() {
        assert_eq!(
            csv_line(&["S1", "a,b", "say \"hi\"", "x\ny"]),
            "S1,\"a,b\",\"say \"\"hi\"\"\",\"x\ny\""
        );
    }

    #[test]
    fn unique_name_uses_extension_hint() {
        assert!(unique_name("csv").ends_with(".csv"));
        assert!(unique_name(".csv").ends_with(".csv"));
        assert!(!unique_name(".csv").contains(".."));
        assert!(!unique_name("").contains('.'));
        assert_ne!(unique_name("csv"), unique_name("csv"));
    }

    #[test]
    fn header_then_rows_in_order() {
        let mut writer = ExportWriter::new(MemorySink::default(), "results", "csv");
        let report = writer
            .write(vec![
                row("S1", "PH", "pH", "7.0"),
                row("S1", "PH", "pH", "7.0"),
                row("S2", "COND", "conductivity", "410"),
            ])
            .unwrap();

        assert_eq!(report.rows_written, 3);
        let lines = &writer.sink().files[&report.target];
        assert_eq!(
            lines,
            &vec![
                "SampleCode,TestCode,ComponentName,Result".to_string(),
                "S1,PH,pH,7.0".to_string(),
                "S1,PH,pH,7.0".to_string(),
                "S2,COND,conductivity,410".to_string(),
            ]
        );
    }

    #[test]
    fn no_rows_still_writes_header() {
        let mut writer = ExportWriter::new(MemorySink::default(), "results", "csv");
        let report = writer.write(Vec::new()).unwrap();
        assert_eq!(report.rows_written, 0);
        assert_eq!(writer.sink().files[&report.target].len(), 1);
    }

    #[test]
    fn append_failure_is_fatal() {
        let sink = MemorySink {
            fail_after: Some(2),
            ..MemorySink::default()
        };
        let mut writer = ExportWriter::new(sink, "results", "csv");
        let err = writer
            .write(vec![row("S1", "PH", "pH", "7.0"), row("S2", "PH", "pH", "6.9")])
            .unwrap_err();
        assert!(matches!(err, LabflowError::SinkWrite(SinkError::Append { .. })));
    }

    #[test]
    fn fs_sink_writes_fresh_file_each_run() {
        let tmp = TempDir::new().unwrap();
        let mut writer = ExportWriter::new(FsSink::new(tmp.path()), "results", "csv");
        let rows = vec![row("S3", "PH", "pH", "7.0")];

        let first = writer.write(rows.clone()).unwrap();
        let second = writer.write(rows).unwrap();
        assert_ne!(first.target, second.target);

        let first_path = writer.sink().path_of(&first.target);
        let second_path = writer.sink().path_of(&second.target);
        assert!(first_path.starts_with(tmp.path().join("results")));

        let first_text = std::fs::read_to_string(first_path).unwrap();
        let second_text = std::fs::read_to_string(second_path).unwrap();
        assert_eq!(first_text, "SampleCode,TestCode,ComponentName,Result\nS3,PH,pH,7.0\n");
        assert_eq!(first_text, second_text);
    }

    #[test]
    fn fs_sink_reports_uncreatable_directory() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut sink = FsSink::new(&blocker);
        let err = sink.create_unique_target("results", "csv").unwrap_err();
        assert!(matches!(err, SinkError::Create { .. }));
    }

    #[test]
    fn fs_sink_refuses_existing_name() {
        let tmp = TempDir::new().unwrap();
        let sink = FsSink::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("results")).unwrap();

        let first = sink.reserve("results", "fixed.csv".into()).unwrap();
        assert!(sink.path_of(&first).is_file());

        let err = sink.reserve("results", "fixed.csv".into()).unwrap_err();
        assert!(matches!(err, SinkError::Exists(name) if name == "results/fixed.csv"));
    }

    #[test]
    fn fs_sink_append_requires_created_target() {
        let tmp = TempDir::new().unwrap();
        let mut sink = FsSink::new(tmp.path());
        let target = ExportTarget {
            directory: "results".into(),
            name: "never-created.csv".into(),
        };
        let err = sink.append_line(&target, "x").unwrap_err();
        assert!(matches!(err, SinkError::Append { .. }));
    }
}
