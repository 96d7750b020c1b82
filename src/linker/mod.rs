//! The linker: resolves a run's frames and links them into the proposal area.
//!
//! ```text
//! DocumentSource -> parser -> resolve -> materialize -> report
//! ```
//!
//! Structural problems in the document stream are fatal and returned as
//! [`LinkerError`]. Problems with individual frames (missing source, a
//! destination field the event lacks, filesystem errors) are recorded per
//! plan and reported in the [`LinkReport`].

pub mod materialize;
mod parser;
pub mod report;
pub mod resolve;
pub mod template;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::RunlinkConfig;
use crate::documents::{DocumentError, RawDocument, RunMetadata, RunRef};
use crate::ports::{DocumentSource, FileSystem};

pub use materialize::{materialize, FailedLink, FsStage, LinkFailure, Materialized};
pub use report::{LinkReport, LinkStatus, LinkSummary};
pub use resolve::Detector;
pub use template::TemplateError;

/// A proposed link for one detector frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkPlan {
    /// Start document uid of the run.
    pub run_uid: String,
    /// Frame as written at acquisition.
    pub source: PathBuf,
    /// Canonical destination, or why it could not be resolved.
    pub destination: Result<PathBuf, TemplateError>,
    /// Analysis directory scaffolded alongside the link.
    pub analysis_dir: PathBuf,
}

impl LinkPlan {
    /// The resolved destination, if any.
    #[must_use]
    pub fn destination_path(&self) -> Option<&Path> {
        self.destination.as_deref().ok()
    }
}

/// The plans resolved for one run.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Metadata from the start document.
    pub metadata: RunMetadata,
    /// One plan per frame, in stream order.
    pub plans: Vec<LinkPlan>,
}

/// A fatal problem with a run's document stream.
#[derive(Debug, thiserror::Error)]
pub enum LinkerError {
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
    /// A document arrived before the start document.
    #[error("{kind} document arrived before the start document")]
    BeforeStart {
        /// Tag of the early document.
        kind: String,
    },
    /// A datum referenced a resource not yet seen.
    #[error("datum references unknown resource {resource}")]
    UnknownResource {
        /// The missing resource uid.
        resource: String,
    },
    /// An event referenced a datum not yet seen.
    #[error("event references unknown datum {datum}")]
    UnknownDatum {
        /// The missing datum id.
        datum: String,
    },
    /// An `AD_TIFF` datum without an integer `point_number`.
    #[error("datum {datum} has no point_number")]
    MissingPointNumber {
        /// The offending datum id.
        datum: String,
    },
    /// An external data key held something other than datum ids.
    #[error("event value for external key {key} is not a datum id")]
    BadDatumReference {
        /// The data key.
        key: String,
    },
    /// A datum's point number and the resource's frames per point overflow the frame index.
    #[error("frame index of datum {datum} overflows")]
    FrameIndexOverflow {
        /// Datum id.
        datum: String,
    },
    /// A resource template could not produce frame paths.
    #[error("resource {resource} has an unusable template: {source}")]
    SourceTemplate {
        /// Resource uid.
        resource: String,
        /// Template failure.
        source: TemplateError,
    },
}

/// Resolves link plans for a run fetched from `source`.
///
/// # Errors
///
/// Returns a [`LinkerError`] if the run cannot be fetched or its document
/// stream is structurally invalid.
pub fn resolve_links(
    source: &dyn DocumentSource,
    run: &RunRef,
    config: &RunlinkConfig,
) -> Result<Resolution, LinkerError> {
    let documents = source
        .documents(run)
        .map_err(|source| LinkerError::Source { run: run.to_string(), source })?;
    resolve_documents(&documents, config)
}

/// Resolves link plans from an in-memory document stream.
///
/// # Errors
///
/// Returns a [`LinkerError`] if the stream is structurally invalid.
pub fn resolve_documents(
    documents: &[RawDocument],
    config: &RunlinkConfig,
) -> Result<Resolution, LinkerError> {
    parser::StreamParser::new(config).run(documents)
}

/// Resolves, materializes and reports the links of one run.
///
/// Per-frame failures land in the report; only structural problems with
/// the document stream are returned as errors.
///
/// # Errors
///
/// Returns a [`LinkerError`] if resolution fails.
pub fn link_run(
    source: &dyn DocumentSource,
    fs: &dyn FileSystem,
    run: &RunRef,
    config: &RunlinkConfig,
) -> Result<LinkReport, LinkerError> {
    info!(%run, "Start linker...");
    let resolution = resolve_links(source, run, config)?;
    info!(
        uid = %resolution.metadata.uid,
        plans = resolution.plans.len(),
        "resolved link plans"
    );

    let materialized = materialize(
        fs,
        resolution.plans,
        &config.linker.analysis_templates,
        config.linker.overwrite,
    );
    let report = LinkReport::new(resolution.metadata.uid, materialized);
    report.log();
    info!(%run, status = %report.status(), "Finish linker.");
    Ok(report)
}
