//! Normalizes single and paged datum/event documents into uniform rows.
//!
//! Callers never branch on encoding: a `datum` yields one row, a
//! `datum_page` yields one row per id, and likewise for events.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse, DocumentError, DocumentKind, RawDocument};

/// One datum, independent of how it was encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DatumRow {
    /// Datum id referenced from events.
    pub datum_id: String,
    /// Handler keyword arguments for this datum.
    pub kwargs: Map<String, Value>,
}

/// One event row, independent of how it was encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    /// Descriptor uid the event belongs to.
    pub descriptor: String,
    /// Sequence number within the stream.
    pub seq_num: u64,
    /// Data values keyed by data key.
    pub data: Map<String, Value>,
}

#[derive(Deserialize)]
struct DatumDoc {
    resource: String,
    datum_id: String,
    #[serde(default)]
    datum_kwargs: Map<String, Value>,
}

#[derive(Deserialize)]
struct DatumPageDoc {
    resource: String,
    datum_id: Vec<String>,
    #[serde(default)]
    datum_kwargs: Map<String, Value>,
}

#[derive(Deserialize)]
struct EventDoc {
    descriptor: String,
    seq_num: u64,
    data: Map<String, Value>,
}

#[derive(Deserialize)]
struct EventPageDoc {
    descriptor: String,
    seq_num: Vec<u64>,
    data: Map<String, Value>,
}

/// Splits a `datum` or `datum_page` into its resource uid and rows.
///
/// # Errors
///
/// Returns a [`DocumentError`] if required fields are missing, a paged
/// kwarg column is not an array, or columns disagree on length.
pub fn datum_rows(document: &RawDocument) -> Result<(String, Vec<DatumRow>), DocumentError> {
    match document.kind() {
        DocumentKind::Datum => {
            let datum: DatumDoc = parse(&document.name, &document.doc)?;
            let row = DatumRow { datum_id: datum.datum_id, kwargs: datum.datum_kwargs };
            Ok((datum.resource, vec![row]))
        }
        DocumentKind::DatumPage => {
            let page: DatumPageDoc = parse(&document.name, &document.doc)?;
            let columns = columns(&document.name, &page.datum_kwargs, page.datum_id.len())?;
            let rows = page
                .datum_id
                .into_iter()
                .enumerate()
                .map(|(i, datum_id)| DatumRow { datum_id, kwargs: row_at(&columns, i) })
                .collect();
            Ok((page.resource, rows))
        }
        _ => Err(DocumentError::malformed(&document.name, "not a datum document")),
    }
}

/// Splits an `event` or `event_page` into rows.
///
/// # Errors
///
/// Returns a [`DocumentError`] if required fields are missing, a paged
/// data column is not an array, or columns disagree on length.
pub fn event_rows(document: &RawDocument) -> Result<Vec<EventRow>, DocumentError> {
    match document.kind() {
        DocumentKind::Event => {
            let event: EventDoc = parse(&document.name, &document.doc)?;
            Ok(vec![EventRow {
                descriptor: event.descriptor,
                seq_num: event.seq_num,
                data: event.data,
            }])
        }
        DocumentKind::EventPage => {
            let page: EventPageDoc = parse(&document.name, &document.doc)?;
            let columns = columns(&document.name, &page.data, page.seq_num.len())?;
            Ok(page
                .seq_num
                .iter()
                .enumerate()
                .map(|(i, &seq_num)| EventRow {
                    descriptor: page.descriptor.clone(),
                    seq_num,
                    data: row_at(&columns, i),
                })
                .collect())
        }
        _ => Err(DocumentError::malformed(&document.name, "not an event document")),
    }
}

/// Checks that every column is an array of `expected` rows.
fn columns<'a>(
    kind: &str,
    table: &'a Map<String, Value>,
    expected: usize,
) -> Result<Vec<(&'a str, &'a [Value])>, DocumentError> {
    table
        .iter()
        .map(|(column, values)| {
            let values = values.as_array().ok_or_else(|| {
                DocumentError::malformed(kind, format!("column {column} is not an array"))
            })?;
            if values.len() != expected {
                return Err(DocumentError::Ragged {
                    kind: kind.to_string(),
                    column: column.clone(),
                    found: values.len(),
                    expected,
                });
            }
            Ok((column.as_str(), values.as_slice()))
        })
        .collect()
}

fn row_at(columns: &[(&str, &[Value])], index: usize) -> Map<String, Value> {
    columns.iter().map(|(column, values)| ((*column).to_string(), values[index].clone())).collect()
}
