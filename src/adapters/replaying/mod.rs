//! Replaying adapters that serve runs from recorded cassettes.

pub mod documents;

pub use documents::ReplayingDocumentSource;
