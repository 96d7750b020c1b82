//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the linker core and an
//! external system (the document store, the filesystem).
//! Implementations live in `src/adapters/`.

pub mod documents;
pub mod filesystem;

pub use documents::{DocumentSource, StaticDocuments};
pub use filesystem::FileSystem;
