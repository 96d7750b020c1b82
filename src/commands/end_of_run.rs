//! `runlink end-of-run` command.

use std::path::Path;

use serde_json::Value;

use crate::config::RunlinkConfig;
use crate::context::ServiceContext;
use crate::documents::RunRef;
use crate::workflow;

/// Execute the `end-of-run` command.
///
/// The run is either given directly or read from the `run_start` field of a
/// stop document file. A `{"name": "stop", "doc": {...}}` wrapper is accepted.
///
/// # Errors
///
/// Returns an error string if the run cannot be determined or any workflow task fails.
pub fn run(
    ctx: &ServiceContext,
    config: &RunlinkConfig,
    run: Option<&RunRef>,
    stop_document: Option<&Path>,
) -> Result<(), String> {
    let run = match (run, stop_document) {
        (Some(run), _) => run.clone(),
        (None, Some(path)) => run_from_file(path)?,
        (None, None) => return Err("end-of-run needs a run or --stop-document".to_string()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;
    let outcome = runtime
        .block_on(workflow::end_of_run(ctx, &run, config))
        .map_err(|e| e.to_string())?;

    let links = outcome.links.summary();
    println!(
        "Run {}: validation passed, links {} ({} linked, {} failed), {}",
        links.run_uid,
        links.status,
        links.linked,
        links.failed,
        outcome.export.map_or_else(
            || "no export".to_string(),
            |e| format!("{} spectra exported", e.files.len())
        )
    );
    Ok(())
}

fn run_from_file(path: &Path) -> Result<RunRef, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read stop document {}: {e}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse stop document {}: {e}", path.display()))?;
    let stop = value.get("doc").filter(|d| d.is_object()).unwrap_or(&value);
    workflow::run_from_stop(stop).map_err(|e| e.to_string())
}
