//! Cassette format for recording and replaying run document streams.

pub mod format;
pub mod library;
pub mod recorder;
