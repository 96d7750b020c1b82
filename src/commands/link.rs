//! `runlink link` command.

use crate::config::RunlinkConfig;
use crate::context::ServiceContext;
use crate::documents::RunRef;
use crate::linker::{self, LinkStatus};

/// Flags of the `link` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    /// Fail unless every frame was linked.
    pub strict: bool,
    /// Only print the planned links.
    pub dry_run: bool,
}

/// Execute the `link` command.
///
/// # Errors
///
/// Returns an error string if the run cannot be resolved, or in strict mode
/// if any frame failed to link.
pub fn run(
    ctx: &ServiceContext,
    config: &RunlinkConfig,
    run: &RunRef,
    options: LinkOptions,
) -> Result<(), String> {
    if options.dry_run {
        let resolution =
            linker::resolve_links(ctx.documents.as_ref(), run, config).map_err(|e| e.to_string())?;
        println!(
            "Run {} (scan {}): {} planned links",
            resolution.metadata.uid,
            resolution.metadata.scan_id,
            resolution.plans.len()
        );
        for plan in &resolution.plans {
            match &plan.destination {
                Ok(dest) => println!("  {} -> {}", plan.source.display(), dest.display()),
                Err(e) => println!("  {} -> <unresolved: {e}>", plan.source.display()),
            }
        }
        return Ok(());
    }

    let report = linker::link_run(ctx.documents.as_ref(), ctx.fs.as_ref(), run, config)
        .map_err(|e| e.to_string())?;
    let summary = report.summary();
    println!(
        "Run {}: {} ({} linked, {} failed)",
        summary.run_uid, summary.status, summary.linked, summary.failed
    );
    for failure in &report.failed {
        println!("  FAILED {}: {}", failure.plan.source.display(), failure.reason);
    }

    if options.strict && matches!(summary.status, LinkStatus::Partial | LinkStatus::Failed) {
        let total = summary.linked + summary.failed;
        return Err(format!("{} of {total} frames failed to link", summary.failed));
    }
    Ok(())
}
