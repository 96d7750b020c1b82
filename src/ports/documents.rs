//! Document source port for fetching a run's document stream.

use crate::documents::{RawDocument, RunRef};

/// Supplies the ordered document stream of a run.
///
/// Abstracting the document store allows the linker to run against recorded
/// cassettes or synthetic streams without a live network connection.
pub trait DocumentSource: Send + Sync {
    /// Returns every document of the run, in stream order.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be found or the store is unreachable.
    fn documents(
        &self,
        run: &RunRef,
    ) -> Result<Vec<RawDocument>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A fixed, in-memory document stream served for any run reference.
#[derive(Debug, Clone, Default)]
pub struct StaticDocuments {
    documents: Vec<RawDocument>,
}

impl StaticDocuments {
    /// Serves `documents` for every request.
    #[must_use]
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self { documents }
    }
}

impl DocumentSource for StaticDocuments {
    fn documents(
        &self,
        _run: &RunRef,
    ) -> Result<Vec<RawDocument>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.documents.clone())
    }
}
