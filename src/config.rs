//! Runtime configuration.
//!
//! Defaults describe the SMI beamline layout. A YAML file (via `--config` or
//! `RUNLINK_CONFIG`) overrides any subset of fields; CLI flags override the
//! file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::documents::RunMetadata;

/// Default proposal area root.
pub const DEFAULT_PROPOSALS_ROOT: &str = "/nsls2/data/smi/proposals";

/// Default destination template, relative to the run's `user_data` directory.
pub const DEFAULT_DESTINATION_TEMPLATE: &str =
    "{det_name}/{sample_name}_id{scan_id}_{N:06d}_{det_type}.tif";

/// Failure to load a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid configuration YAML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunlinkConfig {
    /// Root of the per-proposal data area.
    pub proposals_root: PathBuf,
    /// Linker settings.
    pub linker: LinkerConfig,
    /// Spectra export settings.
    pub export: ExportConfig,
    /// Remote document store settings.
    pub store: StoreConfig,
}

/// Settings for link resolution and materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Detector name to measurement type, e.g. `1M` to `SAXS`.
    pub detector_types: BTreeMap<String, String>,
    /// Resource root rewrites, acquisition root to current root.
    pub root_map: BTreeMap<String, String>,
    /// Replace existing destinations.
    pub overwrite: bool,
    /// Destination filename template relative to `user_data`.
    pub destination_template: String,
    /// Files copied into each newly created analysis directory.
    pub analysis_templates: Vec<PathBuf>,
}

/// Settings for the spectra exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Detector that must be listed in the start document.
    pub detector: String,
    /// Event stream to read.
    pub stream: String,
    /// Column written first in every file.
    pub common_column: String,
    /// Data columns written after the common column, in order.
    pub columns: Vec<String>,
    /// Directory under `user_data` receiving the CSV files.
    pub subdirectory: String,
}

/// Settings for the live document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store.
    pub url: String,
    /// Catalog path holding raw runs.
    pub catalog: String,
    /// Environment variable holding the API key, if any.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RunlinkConfig {
    fn default() -> Self {
        Self {
            proposals_root: PathBuf::from(DEFAULT_PROPOSALS_ROOT),
            linker: LinkerConfig::default(),
            export: ExportConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for LinkerConfig {
    fn default() -> Self {
        let detector_types = [("900KW", "WAXS"), ("1M", "SAXS")]
            .into_iter()
            .map(|(name, kind)| (name.to_string(), kind.to_string()))
            .collect();
        Self {
            detector_types,
            root_map: BTreeMap::new(),
            overwrite: true,
            destination_template: DEFAULT_DESTINATION_TEMPLATE.to_string(),
            analysis_templates: vec![
                PathBuf::from(
                    "/nsls2/data/smi/shared/config/analysis/SAXS_analysis_template.ipynb",
                ),
                PathBuf::from(
                    "/nsls2/data/smi/shared/config/analysis/WAXS_analysis_template.ipynb",
                ),
            ],
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            detector: "amptek".to_string(),
            stream: "primary".to_string(),
            common_column: "amptek_energy_channels".to_string(),
            columns: vec!["amptek_mca_spectrum".to_string()],
            subdirectory: "Amptek".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "https://tiled.nsls2.bnl.gov".to_string(),
            catalog: "smi/raw".to_string(),
            api_key_env: "TILED_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl RunlinkConfig {
    /// Loads a YAML config file; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// `{root}/{cycle}/{data_session}/projects/{project_name}`.
    #[must_use]
    pub fn project_dir(&self, run: &RunMetadata) -> PathBuf {
        self.proposals_root
            .join(&run.cycle)
            .join(&run.data_session)
            .join("projects")
            .join(&run.project_name)
    }

    /// Directory that receives linked frames and exported files.
    #[must_use]
    pub fn user_data_dir(&self, run: &RunMetadata) -> PathBuf {
        self.project_dir(run).join("user_data")
    }

    /// Directory scaffolded for the run's analysis.
    #[must_use]
    pub fn analysis_dir(&self, run: &RunMetadata) -> PathBuf {
        self.project_dir(run).join("analysis")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunMetadata {
        RunMetadata {
            uid: "u".into(),
            scan_id: 7,
            sample_name: "s".into(),
            username: "me".into(),
            cycle: "2024-2".into(),
            data_session: "pass-314159".into(),
            project_name: "films".into(),
        }
    }

    #[test]
    fn defaults_follow_the_proposal_layout() {
        let config = RunlinkConfig::default();
        assert_eq!(
            config.user_data_dir(&run()),
            PathBuf::from("/nsls2/data/smi/proposals/2024-2/pass-314159/projects/films/user_data")
        );
        assert_eq!(
            config.analysis_dir(&run()),
            PathBuf::from("/nsls2/data/smi/proposals/2024-2/pass-314159/projects/films/analysis")
        );
        assert_eq!(config.linker.detector_types["1M"], "SAXS");
        assert!(config.linker.overwrite);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlink.yaml");
        std::fs::write(
            &path,
            "proposals_root: /tmp/proposals\n\
             linker:\n  overwrite: false\n  root_map:\n    /old: /new\n",
        )
        .unwrap();

        let config = RunlinkConfig::load(&path).unwrap();
        assert_eq!(config.proposals_root, PathBuf::from("/tmp/proposals"));
        assert!(!config.linker.overwrite);
        assert_eq!(config.linker.root_map["/old"], "/new");
        assert_eq!(config.linker.destination_template, DEFAULT_DESTINATION_TEMPLATE);
        assert_eq!(config.export.common_column, "amptek_energy_channels");
    }

    #[test]
    fn unreadable_config_reports_path() {
        let err = RunlinkConfig::load(Path::new("/nonexistent/runlink.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/runlink.yaml"));
    }
}
