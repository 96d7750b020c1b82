//! Structural validation of a run's document stream.
//!
//! Checks that the run started, stopped cleanly, and delivered as many
//! events per stream as the stop document claims. Detector data itself is
//! not inspected.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::documents::{self, event_rows, DescriptorDoc, DocumentKind, RawDocument, RunRef, StopDoc};
use crate::ports::DocumentSource;

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Human-readable name describing the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Detail message (what was observed).
    pub detail: String,
}

impl CheckResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), passed: true, detail: detail.into() }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), passed: false, detail: detail.into() }
    }
}

/// Aggregated result of validating one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Start uid, when a start document was found.
    pub run_uid: Option<String>,
    /// Per-check results.
    pub checks: Vec<CheckResult>,
}

impl ValidationResult {
    /// Returns `true` if every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Returns only the checks that failed.
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// The run could not be fetched for validation.
#[derive(Debug, thiserror::Error)]
#[error("failed to fetch documents for run {run}: {source}")]
pub struct ValidationError {
    /// The requested run.
    pub run: String,
    /// Underlying source error.
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Fetches a run and validates its document stream.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the run cannot be fetched. Failed checks
/// are reported in the result, not as errors.
pub fn validate_run(
    source: &dyn DocumentSource,
    run: &RunRef,
) -> Result<ValidationResult, ValidationError> {
    info!(%run, "Start validation...");
    let documents = source
        .documents(run)
        .map_err(|source| ValidationError { run: run.to_string(), source })?;
    let result = validate_documents(&documents);
    for check in result.failed_checks() {
        warn!(check = %check.name, detail = %check.detail, "validation check failed");
    }
    info!(%run, passed = result.passed(), checks = result.checks.len(), "Finish validation.");
    Ok(result)
}

/// Validates an in-memory document stream.
#[must_use]
pub fn validate_documents(documents: &[RawDocument]) -> ValidationResult {
    let mut run_uid = None;
    let mut stop: Option<Result<StopDoc, String>> = None;
    let mut stream_names: HashMap<String, String> = HashMap::new();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut unreadable = Vec::new();

    for document in documents {
        match document.kind() {
            DocumentKind::Start => {
                run_uid = document.doc.get("uid").and_then(|v| v.as_str()).map(str::to_string);
            }
            DocumentKind::Descriptor => {
                match documents::parse::<DescriptorDoc>(&document.name, &document.doc) {
                    Ok(d) => {
                        let name = d.name.unwrap_or_else(|| "primary".to_string());
                        counts.entry(name.clone()).or_default();
                        stream_names.insert(d.uid, name);
                    }
                    Err(e) => unreadable.push(e.to_string()),
                }
            }
            DocumentKind::Event | DocumentKind::EventPage => match event_rows(document) {
                Ok(rows) => {
                    for row in rows {
                        let stream = stream_names
                            .get(&row.descriptor)
                            .cloned()
                            .unwrap_or_else(|| format!("<descriptor {}>", row.descriptor));
                        *counts.entry(stream).or_default() += 1;
                    }
                }
                Err(e) => unreadable.push(e.to_string()),
            },
            DocumentKind::Stop => {
                stop = Some(
                    documents::parse::<StopDoc>(&document.name, &document.doc)
                        .map_err(|e| e.to_string()),
                );
            }
            _ => {}
        }
    }

    let mut checks = Vec::new();
    checks.push(match &run_uid {
        Some(uid) => CheckResult::pass("start-document", format!("run {uid}")),
        None => CheckResult::fail("start-document", "no start document with a uid"),
    });
    checks.push(if unreadable.is_empty() {
        CheckResult::pass("documents-readable", format!("{} documents", documents.len()))
    } else {
        CheckResult::fail("documents-readable", unreadable.join("; "))
    });

    match &stop {
        None => checks.push(CheckResult::fail("stop-document", "run has no stop document")),
        Some(Err(e)) => checks.push(CheckResult::fail("stop-document", e.clone())),
        Some(Ok(stop)) => {
            checks.push(CheckResult::pass("stop-document", "present"));
            checks.push(if stop.exit_status == "success" {
                CheckResult::pass("exit-status", "success")
            } else {
                CheckResult::fail("exit-status", format!("run ended with {}", stop.exit_status))
            });
            for (stream, expected) in &stop.num_events {
                let found = counts.get(stream).copied().unwrap_or(0);
                let name = format!("event-count: {stream}");
                checks.push(if found == *expected {
                    CheckResult::pass(name, format!("{found} events"))
                } else {
                    CheckResult::fail(name, format!("expected {expected} events, found {found}"))
                });
            }
        }
    }

    ValidationResult { run_uid, checks }
}
