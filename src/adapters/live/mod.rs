//! Live adapters for real external interactions.

pub mod documents;
pub mod filesystem;

pub use documents::LiveDocumentSource;
pub use filesystem::LiveFileSystem;
