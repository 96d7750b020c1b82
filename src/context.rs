//! Service context bundling the port trait objects.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::live::{LiveDocumentSource, LiveFileSystem};
use crate::adapters::recording::RecordingDocumentSource;
use crate::adapters::replaying::ReplayingDocumentSource;
use crate::config::StoreConfig;
use crate::ports::{DocumentSource, FileSystem};

/// Bundles the port trait objects into a single context.
///
/// Constructors wire up different adapter implementations (live, replaying,
/// recording). Cloning shares the adapters, so a context can be handed to
/// concurrent tasks.
#[derive(Clone)]
pub struct ServiceContext {
    /// Source of run documents.
    pub documents: Arc<dyn DocumentSource>,
    /// Filesystem for links, analysis directories and exports.
    pub fs: Arc<dyn FileSystem>,
}

impl ServiceContext {
    /// Creates a context from explicit adapters.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentSource>, fs: Arc<dyn FileSystem>) -> Self {
        Self { documents, fs }
    }

    /// Creates a live context talking to the configured document store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn live(store: &StoreConfig) -> Result<Self, String> {
        let documents = LiveDocumentSource::new(store).map_err(|e| e.to_string())?;
        Ok(Self::new(Arc::new(documents), Arc::new(LiveFileSystem)))
    }

    /// Creates a context that records every fetched run into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn recording(store: &StoreConfig, dir: &Path) -> Result<Self, String> {
        let live = LiveDocumentSource::new(store).map_err(|e| e.to_string())?;
        let documents = RecordingDocumentSource::new(Box::new(live), dir);
        Ok(Self::new(Arc::new(documents), Arc::new(LiveFileSystem)))
    }

    /// Creates a context that serves runs from a cassette file or directory.
    ///
    /// The filesystem stays live: links are still written to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if any cassette cannot be read or parsed.
    pub fn replaying(path: &Path) -> Result<Self, String> {
        let documents = ReplayingDocumentSource::load(path).map_err(|e| e.to_string())?;
        Ok(Self::new(Arc::new(documents), Arc::new(LiveFileSystem)))
    }
}
