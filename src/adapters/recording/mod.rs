//! Recording adapters that capture fetched runs to cassettes.

pub mod documents;

pub use documents::RecordingDocumentSource;
