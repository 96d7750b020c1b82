//! Run documents: the `(tag, document)` pairs that describe one acquisition.
//!
//! Documents arrive loosely typed from the document store. The typed views
//! here pull out only the fields the linker, validator and exporter consume;
//! a missing required field surfaces as a [`DocumentError`].

pub mod normalize;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use normalize::{datum_rows, event_rows, DatumRow, EventRow};

/// Reference to a run: either a scan sequence number or an opaque uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunRef {
    /// Integer scan id. Negative values count back from the most recent run.
    ScanId(i64),
    /// Full or partial start-document uid.
    Uid(String),
}

impl FromStr for RunRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("run reference must not be empty".to_string());
        }
        Ok(trimmed.parse::<i64>().map_or_else(|_| Self::Uid(trimmed.to_string()), Self::ScanId))
    }
}

impl fmt::Display for RunRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanId(id) => write!(f, "{id}"),
            Self::Uid(uid) => f.write_str(uid),
        }
    }
}

/// One document of a run's stream, as delivered by the document source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Document tag (`start`, `descriptor`, `resource`, `datum`, ...).
    pub name: String,
    /// The document body.
    pub doc: Value,
}

impl RawDocument {
    /// Creates a document from a tag and body.
    pub fn new(name: impl Into<String>, doc: Value) -> Self {
        Self { name: name.into(), doc }
    }

    /// Classifies the tag.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_tag(&self.name)
    }
}

/// Tags the parser recognizes. Anything else is [`DocumentKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Run start.
    Start,
    /// Event stream descriptor.
    Descriptor,
    /// Externally stored file resource.
    Resource,
    /// Single datum.
    Datum,
    /// Paged datums.
    DatumPage,
    /// Single event.
    Event,
    /// Paged events.
    EventPage,
    /// Run stop.
    Stop,
    /// Unrecognized tag.
    Other,
}

impl DocumentKind {
    /// Maps a document tag to its kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "start" => Self::Start,
            "descriptor" => Self::Descriptor,
            "resource" => Self::Resource,
            "datum" => Self::Datum,
            "datum_page" => Self::DatumPage,
            "event" => Self::Event,
            "event_page" => Self::EventPage,
            "stop" => Self::Stop,
            _ => Self::Other,
        }
    }
}

/// A document lacked a required field or had the wrong shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// The document could not be read as the expected kind.
    #[error("malformed {kind} document: {message}")]
    Malformed {
        /// Document tag.
        kind: String,
        /// What was wrong.
        message: String,
    },
    /// Columns of a paged document disagree on length.
    #[error("{kind} document has ragged columns: {column} has {found} rows, expected {expected}")]
    Ragged {
        /// Document tag.
        kind: String,
        /// Offending column.
        column: String,
        /// Rows found in the column.
        found: usize,
        /// Rows implied by the id column.
        expected: usize,
    },
}

impl DocumentError {
    pub(crate) fn malformed(kind: &str, message: impl Into<String>) -> Self {
        Self::Malformed { kind: kind.to_string(), message: message.into() }
    }
}

/// Deserializes `doc` into a typed view, tagging errors with `kind`.
///
/// # Errors
///
/// Returns [`DocumentError::Malformed`] when required fields are missing or mistyped.
pub fn parse<T: DeserializeOwned>(kind: &str, doc: &Value) -> Result<T, DocumentError> {
    T::deserialize(doc).map_err(|e| DocumentError::malformed(kind, e.to_string()))
}

/// Run-level metadata captured from the `start` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Start document uid.
    pub uid: String,
    /// Scan sequence number.
    pub scan_id: i64,
    /// Sample name as entered by the user.
    pub sample_name: String,
    /// Operator username.
    pub username: String,
    /// Facility cycle, e.g. `2024-2`.
    pub cycle: String,
    /// Data session, e.g. `pass-314159`.
    pub data_session: String,
    /// Project directory name inside the proposal.
    pub project_name: String,
}

/// Fields of a `start` document beyond [`RunMetadata`] used by the exporter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartExtras {
    /// Detectors active during the run.
    #[serde(default)]
    pub detectors: Vec<String>,
}

/// A `resource` document.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDoc {
    /// Resource uid.
    pub uid: String,
    /// Handler spec, e.g. `AD_TIFF`.
    pub spec: String,
    /// Root directory at acquisition time.
    pub root: String,
    /// Path relative to `root`.
    pub resource_path: String,
    /// Handler-specific keyword arguments.
    #[serde(default)]
    pub resource_kwargs: Map<String, Value>,
}

/// Keyword arguments of an `AD_TIFF` resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TiffResourceKwargs {
    /// printf-style template over `(directory, filename, frame_index)`.
    pub template: String,
    /// Base filename written by the area detector.
    pub filename: String,
    /// Frames captured per datum.
    pub frame_per_point: u64,
}

/// A `descriptor` document.
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptorDoc {
    /// Descriptor uid.
    pub uid: String,
    /// Stream name, e.g. `primary`.
    #[serde(default)]
    pub name: Option<String>,
    /// Schema of each data key in the stream.
    pub data_keys: Map<String, Value>,
}

impl DescriptorDoc {
    /// Data keys whose values are stored in external files.
    pub fn external_keys(&self) -> impl Iterator<Item = &str> {
        self.data_keys
            .iter()
            .filter(|(_, schema)| schema.get("external").is_some())
            .map(|(key, _)| key.as_str())
    }
}

/// A `stop` document.
#[derive(Debug, Clone, Deserialize)]
pub struct StopDoc {
    /// uid of the matching start document.
    #[serde(default)]
    pub run_start: Option<String>,
    /// `success`, `abort` or `fail`.
    pub exit_status: String,
    /// Event count per stream name.
    #[serde(default)]
    pub num_events: BTreeMap<String, u64>,
}
