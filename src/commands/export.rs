//! `runlink export` command.

use crate::config::RunlinkConfig;
use crate::context::ServiceContext;
use crate::documents::RunRef;
use crate::export;

/// Execute the `export` command.
///
/// # Errors
///
/// Returns an error string if the run cannot be fetched or a file cannot be written.
pub fn run(ctx: &ServiceContext, config: &RunlinkConfig, run: &RunRef) -> Result<(), String> {
    match export::export_run(ctx.documents.as_ref(), ctx.fs.as_ref(), run, config)
        .map_err(|e| e.to_string())?
    {
        Some(summary) => {
            println!("Exported {} spectra to {}", summary.files.len(), summary.directory.display());
            for file in &summary.files {
                println!("  {}", file.display());
            }
        }
        None => println!("Nothing to export for run {run}"),
    }
    Ok(())
}
