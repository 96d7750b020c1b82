//! Live adapter for the `DocumentSource` port backed by the document store's HTTP API.

use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::StoreConfig;
use crate::documents::{RawDocument, RunRef};
use crate::ports::DocumentSource;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches run documents over HTTP.
pub struct LiveDocumentSource {
    client: Client,
    base_url: String,
    catalog: String,
    api_key: Option<String>,
}

impl LiveDocumentSource {
    /// Creates a client for the configured store.
    ///
    /// The API key is read from the environment variable named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, BoxError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| -> BoxError { format!("failed to build HTTP client: {e}").into() })?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            catalog: config.catalog.trim_matches('/').to_string(),
            api_key: env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
        })
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Apikey {key}")),
            None => request,
        }
    }

    /// Resolves a scan id to a start uid via the search endpoint.
    fn uid_for_scan(&self, scan_id: i64) -> Result<String, BoxError> {
        let url = format!("{}/api/v1/search/{}", self.base_url, self.catalog);
        let mut query = vec![("sort", "-time".to_string()), ("page[limit]", "1".to_string())];
        if scan_id < 0 {
            query.push(("page[offset]", (scan_id.unsigned_abs() - 1).to_string()));
        } else {
            query.push(("filter[eq][condition][key]", "scan_id".to_string()));
            query.push(("filter[eq][condition][value]", scan_id.to_string()));
        }

        let response = self
            .get(&url)
            .query(&query)
            .send()
            .map_err(|e| -> BoxError { format!("search request failed: {e}").into() })?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| -> BoxError { format!("failed to read search response: {e}").into() })?;
        if !status.is_success() {
            return Err(format!("search failed ({}): {text}", status.as_u16()).into());
        }

        let page: SearchPage = serde_json::from_str(&text)
            .map_err(|e| -> BoxError { format!("unexpected search response: {e}").into() })?;
        page.data
            .into_iter()
            .next()
            .map(|entry| entry.id)
            .ok_or_else(|| format!("no run with scan id {scan_id}").into())
    }
}

#[derive(Deserialize)]
struct SearchPage {
    data: Vec<SearchEntry>,
}

#[derive(Deserialize)]
struct SearchEntry {
    id: String,
}

/// One streamed line: either `{"name": ..., "doc": ...}` or `[name, doc]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentLine {
    Object { name: String, doc: Value },
    Pair(String, Value),
}

impl From<DocumentLine> for RawDocument {
    fn from(line: DocumentLine) -> Self {
        match line {
            DocumentLine::Object { name, doc } | DocumentLine::Pair(name, doc) => {
                RawDocument::new(name, doc)
            }
        }
    }
}

/// Parses a newline-delimited JSON document stream.
///
/// A leading record separator (`\x1e`, as in `application/json-seq`) is
/// stripped from each line.
fn parse_stream(body: &str) -> Result<Vec<RawDocument>, BoxError> {
    body.lines()
        .enumerate()
        .map(|(n, line)| (n, line.trim_start_matches('\u{1e}')))
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<DocumentLine>(line).map(RawDocument::from).map_err(
                |e| -> BoxError { format!("line {}: malformed document: {e}", n + 1).into() },
            )
        })
        .collect()
}

impl DocumentSource for LiveDocumentSource {
    fn documents(&self, run: &RunRef) -> Result<Vec<RawDocument>, BoxError> {
        let uid = match run {
            RunRef::ScanId(id) => self.uid_for_scan(*id)?,
            RunRef::Uid(uid) => uid.clone(),
        };
        let url = format!("{}/api/v1/documents/{}/{uid}", self.base_url, self.catalog);
        debug!(%url, "fetching documents");

        let response = self
            .get(&url)
            .header("Accept", "application/x-ndjson")
            .send()
            .map_err(|e| -> BoxError { format!("document request failed: {e}").into() })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| -> BoxError { format!("failed to read documents: {e}").into() })?;
        if !status.is_success() {
            return Err(format!("document store error ({}): {body}", status.as_u16()).into());
        }
        parse_stream(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_line_shapes() {
        let body = "{\"name\": \"start\", \"doc\": {\"uid\": \"u\"}}\n\n\
                    [\"stop\", {\"exit_status\": \"success\"}]\n";
        let docs = parse_stream(body).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "start");
        assert_eq!(docs[1].doc["exit_status"], "success");
    }

    #[test]
    fn record_separators_are_stripped() {
        let body =
            "\u{1e}[\"start\", {\"uid\": \"u\"}]\n\u{1e}{\"name\": \"stop\", \"doc\": {}}\n";
        let docs = parse_stream(body).unwrap();
        let tags: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(tags, vec!["start", "stop"]);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = parse_stream("[\"start\", {}]\nnot json\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{err}");
    }
}
