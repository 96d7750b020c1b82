//! Replaying adapter for the `DocumentSource` port.

use std::path::Path;

use crate::cassette::library::{CassetteError, CassetteLibrary};
use crate::documents::{RawDocument, RunRef};
use crate::ports::DocumentSource;

/// Serves runs from recorded cassettes.
pub struct ReplayingDocumentSource {
    library: CassetteLibrary,
}

impl ReplayingDocumentSource {
    /// Creates a replaying source over a loaded library.
    #[must_use]
    pub fn new(library: CassetteLibrary) -> Self {
        Self { library }
    }

    /// Loads cassettes from a file or directory.
    ///
    /// # Errors
    ///
    /// Returns an error if any cassette cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CassetteError> {
        CassetteLibrary::load(path).map(Self::new)
    }
}

impl DocumentSource for ReplayingDocumentSource {
    fn documents(
        &self,
        run: &RunRef,
    ) -> Result<Vec<RawDocument>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.library.find(run)?.documents.clone())
    }
}
