//! Records a run's documents into a cassette file.

use std::path::PathBuf;

use chrono::Utc;

use super::format::Cassette;
use crate::documents::RawDocument;

/// Collects documents and writes them as a YAML cassette file.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    run_ref: String,
    documents: Vec<RawDocument>,
}

impl CassetteRecorder {
    /// Create a new recorder that will write to the given path.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        run_ref: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            run_ref: run_ref.into(),
            documents: Vec::new(),
        }
    }

    /// Append documents in stream order.
    pub fn record(&mut self, documents: impl IntoIterator<Item = RawDocument>) {
        self.documents.extend(documents);
    }

    /// Finish recording and write the cassette YAML file to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        let cassette = Cassette {
            name: self.name,
            recorded_at: Utc::now(),
            run_ref: self.run_ref,
            documents: self.documents,
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, yaml)?;
        Ok(self.path)
    }
}
