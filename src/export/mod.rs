//! Spectra export: one CSV file per event of a spectrometer stream.
//!
//! Runs whose start document lists the configured detector get each event's
//! spectrum written as `{sample}-{uid prefix}-{index:05}.csv` under the
//! project's `user_data` area. Columns are the common column followed by the
//! data columns, one line per channel.

use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::RunlinkConfig;
use crate::documents::{
    self, event_rows, DescriptorDoc, DocumentError, DocumentKind, RawDocument, RunMetadata,
    RunRef, StartExtras,
};
use crate::ports::{DocumentSource, FileSystem};

/// Files written by one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Directory receiving the files.
    pub directory: PathBuf,
    /// Files written, in event order.
    pub files: Vec<PathBuf>,
}

/// Failure while exporting spectra.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The document source could not deliver the run.
    #[error("failed to fetch documents for run {run}: {source}")]
    Source {
        /// The requested run.
        run: String,
        /// Underlying source error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A document lacked required fields.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// The stream has no start document.
    #[error("document stream has no start document")]
    MissingStart,
    /// An event lacks one of the export columns.
    #[error("event {seq_num} has no column {column}")]
    MissingColumn {
        /// Event sequence number.
        seq_num: u64,
        /// The missing column.
        column: String,
    },
    /// A column value is not a numeric array or has the wrong length.
    #[error("event {seq_num}: column {column} {problem}")]
    BadColumn {
        /// Event sequence number.
        seq_num: u64,
        /// The offending column.
        column: String,
        /// What is wrong with it.
        problem: String,
    },
    /// A file could not be written.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Target file.
        path: PathBuf,
        /// Error reported by the filesystem.
        message: String,
    },
}

/// Fetches a run and exports its spectra.
///
/// Returns `Ok(None)` when the run does not use the export detector or its
/// stream has no export columns.
///
/// # Errors
///
/// Returns an [`ExportError`] if the run cannot be fetched, an event is
/// malformed, or a file cannot be written.
pub fn export_run(
    source: &dyn DocumentSource,
    fs: &dyn FileSystem,
    run: &RunRef,
    config: &RunlinkConfig,
) -> Result<Option<ExportSummary>, ExportError> {
    let documents = source
        .documents(run)
        .map_err(|source| ExportError::Source { run: run.to_string(), source })?;
    export_documents(&documents, fs, config)
}

/// Exports spectra from an in-memory document stream.
///
/// # Errors
///
/// See [`export_run`].
pub fn export_documents(
    documents: &[RawDocument],
    fs: &dyn FileSystem,
    config: &RunlinkConfig,
) -> Result<Option<ExportSummary>, ExportError> {
    let settings = &config.export;
    let start = documents
        .iter()
        .find(|d| d.kind() == DocumentKind::Start)
        .ok_or(ExportError::MissingStart)?;
    let extras: StartExtras = documents::parse(&start.name, &start.doc)?;
    if !extras.detectors.iter().any(|d| d == &settings.detector) {
        info!(detector = %settings.detector, "detector not in run, skipping export");
        return Ok(None);
    }
    let run: RunMetadata = documents::parse(&start.name, &start.doc)?;

    let mut descriptors = Vec::new();
    let mut has_columns = false;
    for document in documents.iter().filter(|d| d.kind() == DocumentKind::Descriptor) {
        let descriptor: DescriptorDoc = documents::parse(&document.name, &document.doc)?;
        if descriptor.name.as_deref() == Some(settings.stream.as_str()) {
            has_columns |= descriptor.data_keys.contains_key(&settings.common_column)
                && settings.columns.iter().all(|c| descriptor.data_keys.contains_key(c));
            descriptors.push(descriptor.uid);
        }
    }
    if !has_columns {
        info!(stream = %settings.stream, "export columns not present, skipping export");
        return Ok(None);
    }

    let directory = config.user_data_dir(&run).join(&settings.subdirectory);
    let uid_prefix = run.uid.split('-').next().unwrap_or(&run.uid);
    let mut rows = Vec::new();
    for document in documents {
        match document.kind() {
            DocumentKind::Event | DocumentKind::EventPage => {
                let events = event_rows(document)?;
                rows.extend(events.into_iter().filter(|r| descriptors.contains(&r.descriptor)));
            }
            DocumentKind::Stop => break,
            _ => {}
        }
    }

    let started = Instant::now();
    info!("Start exporting of {} spectra to {}", rows.len(), directory.display());
    let mut files = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let path = directory.join(format!("{}-{uid_prefix}-{:05}.csv", run.sample_name, i + 1));
        let csv = spectrum_csv(row.seq_num, &row.data, &settings.common_column, &settings.columns)?;

        let file_started = Instant::now();
        fs.write(&path, &csv)
            .map_err(|e| ExportError::Write { path: path.clone(), message: e.to_string() })?;
        info!(
            "Exporting to {} took {:.5}s",
            path.display(),
            file_started.elapsed().as_secs_f64()
        );
        files.push(path);
    }
    info!("Exporting of {} spectra took {:.5}s", files.len(), started.elapsed().as_secs_f64());

    if files.is_empty() {
        warn!(stream = %settings.stream, "no events to export");
    }
    Ok(Some(ExportSummary { directory, files }))
}

/// Renders one event as CSV: a header, then one line per channel.
fn spectrum_csv(
    seq_num: u64,
    data: &serde_json::Map<String, Value>,
    common_column: &str,
    columns: &[String],
) -> Result<String, ExportError> {
    let names: Vec<&str> =
        std::iter::once(common_column).chain(columns.iter().map(String::as_str)).collect();
    let mut series: Vec<&[Value]> = Vec::with_capacity(names.len());
    for name in &names {
        let value = data.get(*name).ok_or_else(|| ExportError::MissingColumn {
            seq_num,
            column: (*name).to_string(),
        })?;
        let values = value.as_array().ok_or_else(|| ExportError::BadColumn {
            seq_num,
            column: (*name).to_string(),
            problem: "is not an array".to_string(),
        })?;
        series.push(values.as_slice());
    }

    let channels = series[0].len();
    let mut out = names.join(",");
    out.push('\n');
    for (name, values) in names.iter().zip(&series) {
        if values.len() != channels {
            return Err(ExportError::BadColumn {
                seq_num,
                column: (*name).to_string(),
                problem: format!("has {} channels, expected {channels}", values.len()),
            });
        }
    }
    for channel in 0..channels {
        let line: Vec<String> = series
            .iter()
            .map(|values| cell(&values[channel]))
            .collect::<Result<_, _>>()
            .map_err(|problem| ExportError::BadColumn {
                seq_num,
                column: names.join("/"),
                problem,
            })?;
        out.push_str(&line.join(","));
        out.push('\n');
    }
    Ok(out)
}

fn cell(value: &Value) -> Result<String, String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("holds non-numeric value {other}")),
    }
}
