//! Path resolution: maps one detector frame to its source and destination.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::template::{self, FieldValue, Fields, PrintfArg, TemplateError};
use crate::documents::{RunMetadata, TiffResourceKwargs};

/// Prefix area detector plugins carry on their data keys (`pil1M_image`).
const DETECTOR_PREFIX: &str = "pil";

/// A detector derived from an external data key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    /// Detector name, e.g. `1M`.
    pub name: String,
    /// Measurement type, e.g. `SAXS`; the name itself when unmapped.
    pub kind: String,
}

impl Detector {
    /// Derives the detector for a data key.
    ///
    /// Takes the key up to the first `_`, strips a leading `pil`, and looks
    /// the result up in `types`.
    #[must_use]
    pub fn from_key(key: &str, types: &BTreeMap<String, String>) -> Self {
        let (head, _) = key.split_once('_').unwrap_or((key, ""));
        let name = head.strip_prefix(DETECTOR_PREFIX).unwrap_or(head).to_string();
        let kind = types.get(&name).cloned().unwrap_or_else(|| name.clone());
        Self { name, kind }
    }
}

/// A registered `AD_TIFF` resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Resource uid.
    pub uid: String,
    /// Directory holding the frames, after root rewriting.
    pub path: PathBuf,
    /// Template, base filename and frames per point.
    pub kwargs: TiffResourceKwargs,
}

impl ResourceRecord {
    /// Index of frame `offset` of datum `point_number`, or `None` if it
    /// does not fit in a `u64`.
    #[must_use]
    pub fn frame_index(&self, point_number: u64, offset: u64) -> Option<u64> {
        point_number.checked_mul(self.kwargs.frame_per_point)?.checked_add(offset)
    }

    /// Path of the frame with the given index, as written at acquisition.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the resource template does not accept
    /// `(directory, filename, index)`.
    pub fn source_path(&self, frame_index: u64) -> Result<PathBuf, TemplateError> {
        let directory = format!("{}/", self.path.display());
        let rendered = template::format_printf(
            &self.kwargs.template,
            &[
                PrintfArg::Text(directory),
                PrintfArg::Text(self.kwargs.filename.clone()),
                PrintfArg::Int(frame_index),
            ],
        )?;
        Ok(PathBuf::from(rendered))
    }
}

/// Rewrites `root` through `root_map`, then joins `resource_path`.
#[must_use]
pub fn resource_directory(
    root: &str,
    resource_path: &str,
    root_map: &BTreeMap<String, String>,
) -> PathBuf {
    let root = root_map.get(root).map_or(root, String::as_str);
    Path::new(root).join(resource_path)
}

/// Per-run state needed to resolve destinations.
#[derive(Debug, Clone)]
pub struct RunTargets {
    /// Metadata captured from the start document.
    pub metadata: RunMetadata,
    /// Root for linked frames.
    pub target_path: PathBuf,
    /// Analysis scaffold directory.
    pub analysis_path: PathBuf,
    /// Destination template relative to `target_path`.
    pub destination_template: String,
}

impl RunTargets {
    /// Resolves the destination of one frame.
    ///
    /// Stage one uses `det_name`, `N`, `det_type` and the run metadata;
    /// stage two uses the event row's scalar fields.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if any placeholder is left unresolved.
    pub fn destination(
        &self,
        detector: &Detector,
        frame_index: u64,
        row: &Map<String, Value>,
    ) -> Result<PathBuf, TemplateError> {
        let structural = self.structural_fields(detector, frame_index);
        let event: Fields = row
            .iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        let relative =
            template::resolve_two_stage(&self.destination_template, &structural, &event)?;
        Ok(self.target_path.join(relative))
    }

    fn structural_fields(&self, detector: &Detector, frame_index: u64) -> Fields {
        let run = &self.metadata;
        let mut fields = Fields::new();
        fields.insert("det_name".into(), detector.name.as_str().into());
        fields.insert("det_type".into(), detector.kind.as_str().into());
        fields.insert(
            "N".into(),
            i64::try_from(frame_index)
                .map_or(FieldValue::Text(frame_index.to_string()), FieldValue::Int),
        );
        fields.insert("uid".into(), run.uid.as_str().into());
        fields.insert("scan_id".into(), run.scan_id.into());
        fields.insert("sample_name".into(), run.sample_name.as_str().into());
        fields.insert("username".into(), run.username.as_str().into());
        fields.insert("cycle".into(), run.cycle.as_str().into());
        fields.insert("data_session".into(), run.data_session.as_str().into());
        fields.insert("project_name".into(), run.project_name.as_str().into());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector_types() -> BTreeMap<String, String> {
        [("900KW", "WAXS"), ("1M", "SAXS")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn targets(template: &str) -> RunTargets {
        RunTargets {
            metadata: RunMetadata {
                uid: "1a2b3c4d-0000".into(),
                scan_id: 1234,
                sample_name: "film_A".into(),
                username: "me".into(),
                cycle: "2024-2".into(),
                data_session: "pass-1".into(),
                project_name: "films".into(),
            },
            target_path: PathBuf::from("/proposals/2024-2/pass-1/projects/films/user_data"),
            analysis_path: PathBuf::from("/proposals/2024-2/pass-1/projects/films/analysis"),
            destination_template: template.to_string(),
        }
    }

    #[test]
    fn detector_names_strip_the_plugin_prefix() {
        let types = detector_types();
        assert_eq!(
            Detector::from_key("pil1M_image", &types),
            Detector { name: "1M".into(), kind: "SAXS".into() }
        );
        assert_eq!(Detector::from_key("900KW_image", &types).kind, "WAXS");
        assert_eq!(
            Detector::from_key("foo_image", &types),
            Detector { name: "foo".into(), kind: "foo".into() }
        );
        assert_eq!(Detector::from_key("pil900KW", &types).name, "900KW");
    }

    #[test]
    fn root_map_rewrites_acquisition_root() {
        let map = [("/ioc/data".to_string(), "/nsls2/data/smi/assets".to_string())].into();
        assert_eq!(
            resource_directory("/ioc/data", "2024/09/01", &map),
            PathBuf::from("/nsls2/data/smi/assets/2024/09/01")
        );
        assert_eq!(
            resource_directory("/other", "x", &map),
            PathBuf::from("/other/x")
        );
    }

    #[test]
    fn source_path_numbers_frames_per_point() {
        let resource = ResourceRecord {
            uid: "r1".into(),
            path: PathBuf::from("/assets/2024/09"),
            kwargs: TiffResourceKwargs {
                template: "%s%s_%06d.tif".into(),
                filename: "scan".into(),
                frame_per_point: 2,
            },
        };
        assert_eq!(resource.frame_index(3, 1), Some(7));
        assert_eq!(resource.frame_index(u64::MAX / 2 + 1, 1), None);
        assert_eq!(
            resource.source_path(7).unwrap(),
            PathBuf::from("/assets/2024/09/scan_000007.tif")
        );
    }

    #[test]
    fn destination_uses_default_layout() {
        let targets = targets(crate::config::DEFAULT_DESTINATION_TEMPLATE);
        let detector = Detector::from_key("pil1M_image", &detector_types());
        let dest = targets.destination(&detector, 6, &Map::new()).unwrap();
        assert_eq!(
            dest,
            PathBuf::from(
                "/proposals/2024-2/pass-1/projects/films/user_data/1M/film_A_id1234_000006_SAXS.tif"
            )
        );
    }

    #[test]
    fn destination_pulls_event_fields_in_second_stage() {
        let targets = targets("{det_name}/{sample_name}_{energy:.0f}eV_{N:06d}.tif");
        let detector = Detector::from_key("pil900KW_image", &detector_types());
        let row = json!({"energy": 16100.4, "pil900KW_image": "d/0"});
        let dest = targets.destination(&detector, 0, row.as_object().unwrap()).unwrap();
        assert!(dest.ends_with("900KW/film_A_16100eV_000000.tif"), "{}", dest.display());

        let err = targets.destination(&detector, 0, &Map::new()).unwrap_err();
        assert_eq!(err, TemplateError::Unresolved(vec!["energy".into()]));
    }
}
