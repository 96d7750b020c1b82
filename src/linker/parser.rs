//! Single-pass scan of a run's document stream into link plans.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, trace};

use super::resolve::{resource_directory, Detector, ResourceRecord, RunTargets};
use super::{LinkPlan, LinkerError, Resolution};
use crate::config::RunlinkConfig;
use crate::documents::{
    self, datum_rows, event_rows, DescriptorDoc, DocumentKind, RawDocument, ResourceDoc,
    RunMetadata, TiffResourceKwargs,
};

/// Resource spec of area-detector TIFF series.
const AD_TIFF: &str = "AD_TIFF";

/// A datum resolved to its resource and point number.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DatumRecord {
    resource_uid: String,
    point_number: u64,
}

/// Lookup tables grown while scanning one run.
pub(crate) struct StreamParser<'a> {
    config: &'a RunlinkConfig,
    run: Option<RunTargets>,
    resources: HashMap<String, ResourceRecord>,
    skipped_resources: HashSet<String>,
    datums: HashMap<String, DatumRecord>,
    skipped_datums: HashSet<String>,
    target_keys: BTreeSet<String>,
    plans: Vec<LinkPlan>,
}

impl<'a> StreamParser<'a> {
    pub(crate) fn new(config: &'a RunlinkConfig) -> Self {
        Self {
            config,
            run: None,
            resources: HashMap::new(),
            skipped_resources: HashSet::new(),
            datums: HashMap::new(),
            skipped_datums: HashSet::new(),
            target_keys: BTreeSet::new(),
            plans: Vec::new(),
        }
    }

    /// Scans `documents` up to the first `stop`.
    pub(crate) fn run(
        mut self,
        documents: &[RawDocument],
    ) -> Result<Resolution, LinkerError> {
        for document in documents {
            trace!(name = %document.name, "document");
            match document.kind() {
                DocumentKind::Start => self.on_start(document)?,
                DocumentKind::Resource => self.on_resource(document)?,
                DocumentKind::Datum | DocumentKind::DatumPage => self.on_datum(document)?,
                DocumentKind::Descriptor => self.on_descriptor(document)?,
                DocumentKind::Event | DocumentKind::EventPage => self.on_event(document)?,
                DocumentKind::Stop => break,
                DocumentKind::Other => debug!(name = %document.name, "ignoring document"),
            }
        }

        let run = self.run.ok_or(LinkerError::MissingStart)?;
        Ok(Resolution { metadata: run.metadata, plans: self.plans })
    }

    fn require_start(&self, kind: &str) -> Result<&RunTargets, LinkerError> {
        self.run.as_ref().ok_or_else(|| LinkerError::BeforeStart { kind: kind.to_string() })
    }

    fn on_start(&mut self, document: &RawDocument) -> Result<(), LinkerError> {
        let metadata: RunMetadata = documents::parse(&document.name, &document.doc)?;
        debug!(uid = %metadata.uid, scan_id = metadata.scan_id, "run start");
        self.run = Some(RunTargets {
            target_path: self.config.user_data_dir(&metadata),
            analysis_path: self.config.analysis_dir(&metadata),
            destination_template: self.config.linker.destination_template.clone(),
            metadata,
        });
        Ok(())
    }

    fn on_resource(&mut self, document: &RawDocument) -> Result<(), LinkerError> {
        self.require_start(&document.name)?;
        let resource: ResourceDoc = documents::parse(&document.name, &document.doc)?;
        if resource.spec != AD_TIFF {
            debug!(uid = %resource.uid, spec = %resource.spec, "skipping non-image resource");
            self.skipped_resources.insert(resource.uid);
            return Ok(());
        }

        let kwargs: TiffResourceKwargs = documents::parse(
            "resource_kwargs",
            &Value::Object(resource.resource_kwargs),
        )?;
        let path = resource_directory(
            &resource.root,
            &resource.resource_path,
            &self.config.linker.root_map,
        );
        self.resources
            .insert(resource.uid.clone(), ResourceRecord { uid: resource.uid, path, kwargs });
        Ok(())
    }

    fn on_datum(&mut self, document: &RawDocument) -> Result<(), LinkerError> {
        self.require_start(&document.name)?;
        let (resource_uid, rows) = datum_rows(document)?;

        if self.skipped_resources.contains(&resource_uid) {
            self.skipped_datums.extend(rows.into_iter().map(|row| row.datum_id));
            return Ok(());
        }
        if !self.resources.contains_key(&resource_uid) {
            return Err(LinkerError::UnknownResource { resource: resource_uid });
        }

        for row in rows {
            let point_number = row.kwargs.get("point_number").and_then(Value::as_u64).ok_or_else(
                || LinkerError::MissingPointNumber { datum: row.datum_id.clone() },
            )?;
            self.datums.insert(
                row.datum_id,
                DatumRecord { resource_uid: resource_uid.clone(), point_number },
            );
        }
        Ok(())
    }

    fn on_descriptor(&mut self, document: &RawDocument) -> Result<(), LinkerError> {
        self.require_start(&document.name)?;
        let descriptor: DescriptorDoc = documents::parse(&document.name, &document.doc)?;
        for key in descriptor.external_keys() {
            if self.target_keys.insert(key.to_string()) {
                debug!(key, descriptor = %descriptor.uid, "external data key");
            }
        }
        Ok(())
    }

    fn on_event(&mut self, document: &RawDocument) -> Result<(), LinkerError> {
        let run = self.require_start(&document.name)?;
        let mut plans = Vec::new();

        for row in event_rows(document)? {
            for key in &self.target_keys {
                let Some(value) = row.data.get(key) else {
                    continue;
                };
                let detector = Detector::from_key(key, &self.config.linker.detector_types);

                for datum_id in datum_ids(key, value)? {
                    let Some(datum) = self.datums.get(datum_id) else {
                        if self.skipped_datums.contains(datum_id) {
                            continue;
                        }
                        return Err(LinkerError::UnknownDatum { datum: datum_id.to_string() });
                    };
                    let resource = self.resources.get(&datum.resource_uid).ok_or_else(|| {
                        LinkerError::UnknownResource { resource: datum.resource_uid.clone() }
                    })?;

                    for offset in 0..resource.kwargs.frame_per_point {
                        let frame_index = resource
                            .frame_index(datum.point_number, offset)
                            .ok_or_else(|| LinkerError::FrameIndexOverflow {
                                datum: datum_id.to_string(),
                            })?;
                        let source = resource.source_path(frame_index).map_err(|source| {
                            LinkerError::SourceTemplate { resource: resource.uid.clone(), source }
                        })?;
                        plans.push(LinkPlan {
                            run_uid: run.metadata.uid.clone(),
                            source,
                            destination: run.destination(&detector, frame_index, &row.data),
                            analysis_dir: run.analysis_path.clone(),
                        });
                    }
                }
            }
        }

        self.plans.extend(plans);
        Ok(())
    }
}

/// Datum ids referenced by an event value: one id or a list of ids.
fn datum_ids<'v>(key: &str, value: &'v Value) -> Result<Vec<&'v str>, LinkerError> {
    let bad = || LinkerError::BadDatumReference { key: key.to_string() };
    match value {
        Value::String(id) => Ok(vec![id.as_str()]),
        Value::Array(items) => items.iter().map(|item| item.as_str().ok_or_else(bad)).collect(),
        _ => Err(bad()),
    }
}
