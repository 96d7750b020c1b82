//! End-of-run workflow: validation, linking and export of one finished run.
//!
//! The three tasks are independent readers of the same run, so they run
//! concurrently on the blocking pool and are joined before the outcome is
//! reported.

use serde_json::Value;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{error, info};

use crate::config::RunlinkConfig;
use crate::context::ServiceContext;
use crate::documents::RunRef;
use crate::export::{self, ExportError, ExportSummary};
use crate::linker::{self, LinkReport, LinkerError};
use crate::validate::{self, ValidationError, ValidationResult};

/// Results of every task of a successful workflow.
#[derive(Debug)]
pub struct EndOfRunOutcome {
    /// Validation checks; all passed.
    pub validation: ValidationResult,
    /// Link report. Individual frames may still have failed.
    pub links: LinkReport,
    /// Exported spectra, when the run used the export detector.
    pub export: Option<ExportSummary>,
}

/// A task of the workflow failed.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The stop document does not name its run.
    #[error("stop document has no run_start")]
    MissingRunStart,
    /// The run could not be fetched for validation.
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    /// One or more validation checks failed.
    #[error("validation failed: {}", .0.join(", "))]
    ChecksFailed(Vec<String>),
    /// The linker hit a fatal error.
    #[error("linker: {0}")]
    Linker(#[from] LinkerError),
    /// The exporter hit a fatal error.
    #[error("export: {0}")]
    Export(#[from] ExportError),
    /// A task panicked or was cancelled.
    #[error("task {task} did not complete: {source}")]
    Join {
        /// Task name.
        task: &'static str,
        /// Runtime error.
        source: JoinError,
    },
}

/// Reads the run reference out of a stop document.
///
/// # Errors
///
/// Returns [`WorkflowError::MissingRunStart`] if `run_start` is absent or empty.
pub fn run_from_stop(stop: &Value) -> Result<RunRef, WorkflowError> {
    stop.get("run_start")
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
        .map(|uid| RunRef::Uid(uid.to_string()))
        .ok_or(WorkflowError::MissingRunStart)
}

/// Runs validation, linker and export for `run` concurrently and waits for all three.
///
/// Every task runs to completion even when another fails. Failures are
/// logged as they are found and the first one, in task order, is returned.
///
/// # Errors
///
/// Returns a [`WorkflowError`] if any task fails fatally or a validation
/// check fails. Per-frame link failures are not errors.
pub async fn end_of_run(
    ctx: &ServiceContext,
    run: &RunRef,
    config: &RunlinkConfig,
) -> Result<EndOfRunOutcome, WorkflowError> {
    let validation = {
        let (ctx, run) = (ctx.clone(), run.clone());
        spawn_blocking(move || validate::validate_run(ctx.documents.as_ref(), &run))
    };
    let links = {
        let (ctx, run, config) = (ctx.clone(), run.clone(), config.clone());
        spawn_blocking(move || {
            linker::link_run(ctx.documents.as_ref(), ctx.fs.as_ref(), &run, &config)
        })
    };
    let export = {
        let (ctx, run, config) = (ctx.clone(), run.clone(), config.clone());
        spawn_blocking(move || {
            export::export_run(ctx.documents.as_ref(), ctx.fs.as_ref(), &run, &config)
        })
    };
    let (validation, links, export) = tokio::join!(validation, links, export);

    let validation = joined("validation", validation).and_then(|result| {
        let result = result?;
        if result.passed() {
            Ok(result)
        } else {
            let failed = result.failed_checks();
            Err(WorkflowError::ChecksFailed(
                failed.iter().map(|c| format!("{} ({})", c.name, c.detail)).collect(),
            ))
        }
    });
    let links = joined("linker", links).and_then(|r| r.map_err(WorkflowError::from));
    let export = joined("export", export).and_then(|r| r.map_err(WorkflowError::from));

    for failure in [validation.as_ref().err(), links.as_ref().err(), export.as_ref().err()]
        .into_iter()
        .flatten()
    {
        error!(%run, error = %failure, "end-of-run task failed");
    }

    let outcome = EndOfRunOutcome { validation: validation?, links: links?, export: export? };
    info!(%run, links = %outcome.links.status(), "Complete");
    Ok(outcome)
}

fn joined<T>(task: &'static str, result: Result<T, JoinError>) -> Result<T, WorkflowError> {
    result.map_err(|source| WorkflowError::Join { task, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::live::LiveFileSystem;
    use crate::documents::RawDocument;
    use crate::linker::LinkStatus;
    use crate::ports::StaticDocuments;
    use serde_json::json;
    use std::sync::Arc;

    fn run_documents(root: &std::path::Path, exit_status: &str) -> Vec<RawDocument> {
        vec![
            RawDocument::new(
                "start",
                json!({
                    "uid": "0f1e2d3c-aaaa", "scan_id": 77, "sample_name": "film",
                    "username": "u", "cycle": "2025-1", "data_session": "pass-9",
                    "project_name": "p", "detectors": ["pil1M"]
                }),
            ),
            RawDocument::new(
                "resource",
                json!({
                    "uid": "r-1", "spec": "AD_TIFF", "root": root.to_str().unwrap(),
                    "resource_path": "raw",
                    "resource_kwargs": {
                        "template": "%s%s_%6.6d.tiff",
                        "filename": "img",
                        "frame_per_point": 1
                    }
                }),
            ),
            RawDocument::new(
                "descriptor",
                json!({
                    "uid": "d-1", "name": "primary",
                    "data_keys": {"pil1M_image": {"dtype": "array", "external": "FILESTORE:"}}
                }),
            ),
            RawDocument::new(
                "datum",
                json!({
                    "datum_id": "r-1/0",
                    "resource": "r-1",
                    "datum_kwargs": {"point_number": 0}
                }),
            ),
            RawDocument::new(
                "event",
                json!({"descriptor": "d-1", "seq_num": 1, "data": {"pil1M_image": "r-1/0"}}),
            ),
            RawDocument::new(
                "stop",
                json!({
                    "run_start": "0f1e2d3c-aaaa",
                    "exit_status": exit_status,
                    "num_events": {"primary": 1}
                }),
            ),
        ]
    }

    fn context(docs: Vec<RawDocument>) -> ServiceContext {
        ServiceContext::new(Arc::new(StaticDocuments::new(docs)), Arc::new(LiveFileSystem))
    }

    fn config(root: &std::path::Path) -> RunlinkConfig {
        let mut config =
            RunlinkConfig { proposals_root: root.join("proposals"), ..RunlinkConfig::default() };
        config.linker.analysis_templates.clear();
        config
    }

    #[tokio::test]
    async fn clean_run_validates_links_and_skips_export() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("raw")).unwrap();
        std::fs::write(dir.path().join("raw/img_000000.tiff"), b"frame").unwrap();

        let ctx = context(run_documents(dir.path(), "success"));
        let outcome = end_of_run(&ctx, &RunRef::ScanId(77), &config(dir.path())).await.unwrap();

        assert!(outcome.validation.passed());
        assert_eq!(outcome.links.status(), LinkStatus::Complete);
        assert!(outcome.export.is_none());
        let link = dir
            .path()
            .join("proposals/2025-1/pass-9/projects/p/user_data/1M/film_id77_000000_SAXS.tif");
        assert_eq!(std::fs::read(link).unwrap(), b"frame");
    }

    #[tokio::test]
    async fn failed_validation_fails_the_run_after_linking() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("raw")).unwrap();
        std::fs::write(dir.path().join("raw/img_000000.tiff"), b"frame").unwrap();
        let ctx = context(run_documents(dir.path(), "abort"));
        let err = end_of_run(&ctx, &RunRef::ScanId(77), &config(dir.path())).await.unwrap_err();

        assert!(
            matches!(err, WorkflowError::ChecksFailed(ref checks) if checks.len() == 1),
            "{err}"
        );
        assert!(dir.path().join("proposals/2025-1/pass-9/projects/p/analysis").is_dir());
    }

    #[test]
    fn run_start_is_read_from_stop_document() {
        let run = run_from_stop(&json!({"run_start": "abc", "exit_status": "success"})).unwrap();
        assert_eq!(run, RunRef::Uid("abc".into()));
        assert!(matches!(run_from_stop(&json!({})), Err(WorkflowError::MissingRunStart)));
    }
}
