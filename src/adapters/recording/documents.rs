//! Recording adapter for the `DocumentSource` port.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::cassette::recorder::CassetteRecorder;
use crate::documents::{RawDocument, RunRef};
use crate::ports::DocumentSource;

/// Delegates to an inner source and writes each fetched run as a cassette.
///
/// Cassettes are named `{uid}.cassette.yaml` inside the recording directory.
pub struct RecordingDocumentSource {
    inner: Box<dyn DocumentSource>,
    dir: PathBuf,
}

impl RecordingDocumentSource {
    /// Creates a recording source writing into `dir`.
    pub fn new(inner: Box<dyn DocumentSource>, dir: impl Into<PathBuf>) -> Self {
        Self { inner, dir: dir.into() }
    }
}

fn start_uid(documents: &[RawDocument]) -> Option<String> {
    documents
        .iter()
        .find(|d| d.name == "start")
        .and_then(|d| d.doc.get("uid"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Keeps ASCII alphanumerics, `-`, `_` and `.`; anything else becomes `_`.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

impl DocumentSource for RecordingDocumentSource {
    fn documents(
        &self,
        run: &RunRef,
    ) -> Result<Vec<RawDocument>, Box<dyn std::error::Error + Send + Sync>> {
        let documents = self.inner.documents(run)?;
        let stem = file_stem(&start_uid(&documents).unwrap_or_else(|| run.to_string()));

        let mut recorder = CassetteRecorder::new(
            self.dir.join(format!("{stem}.cassette.yaml")),
            stem,
            run.to_string(),
        );
        recorder.record(documents.iter().cloned());
        match recorder.finish() {
            Ok(path) => info!(path = %path.display(), "recorded cassette"),
            Err(e) => warn!(error = %e, "failed to write cassette"),
        }
        Ok(documents)
    }
}
