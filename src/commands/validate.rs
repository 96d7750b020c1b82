//! `runlink validate` command.

use crate::context::ServiceContext;
use crate::documents::RunRef;
use crate::validate;

/// Execute the `validate` command.
///
/// # Errors
///
/// Returns an error string if the run cannot be fetched or any check fails.
pub fn run(ctx: &ServiceContext, run: &RunRef) -> Result<(), String> {
    let result = validate::validate_run(ctx.documents.as_ref(), run).map_err(|e| e.to_string())?;
    for check in &result.checks {
        let mark = if check.passed { "PASS" } else { "FAIL" };
        println!("[{mark}] {}: {}", check.name, check.detail);
    }
    if result.passed() {
        Ok(())
    } else {
        Err(format!("{} validation checks failed", result.failed_checks().len()))
    }
}
