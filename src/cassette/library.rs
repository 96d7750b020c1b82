//! Loads cassettes from disk and looks runs up in them.

use std::path::{Path, PathBuf};

use super::format::Cassette;
use crate::documents::RunRef;

/// Failure to load or look up a cassette.
#[derive(Debug, thiserror::Error)]
pub enum CassetteError {
    /// A cassette file or directory could not be read.
    #[error("failed to read cassette {path}: {source}")]
    Read {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A cassette file is not valid YAML for the cassette format.
    #[error("failed to parse cassette {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
    /// No cassette holds the requested run.
    #[error("no cassette recorded for run {0}")]
    NotFound(String),
    /// A uid prefix matched more than one cassette.
    #[error("run {run} is ambiguous: {count} cassettes match")]
    Ambiguous {
        /// The requested run.
        run: String,
        /// Number of matching cassettes.
        count: usize,
    },
}

/// A set of recorded runs.
#[derive(Debug, Clone, Default)]
pub struct CassetteLibrary {
    cassettes: Vec<Cassette>,
}

impl CassetteLibrary {
    /// Wraps already loaded cassettes.
    #[must_use]
    pub fn new(cassettes: Vec<Cassette>) -> Self {
        Self { cassettes }
    }

    /// Loads a single cassette file, or every `.yaml`/`.yml` file in a directory.
    ///
    /// # Errors
    ///
    /// Returns a [`CassetteError`] if any file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CassetteError> {
        let read_err = |source| CassetteError::Read { path: path.to_path_buf(), source };
        if !path.is_dir() {
            return Ok(Self::new(vec![read_cassette(path)?]));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(read_err)? {
            let file = entry.map_err(read_err)?.path();
            let is_yaml = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml && file.is_file() {
                files.push(file);
            }
        }
        files.sort();
        let cassettes = files.iter().map(|f| read_cassette(f)).collect::<Result<_, _>>()?;
        Ok(Self::new(cassettes))
    }

    /// Number of loaded cassettes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cassettes.len()
    }

    /// Returns `true` if no cassettes are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cassettes.is_empty()
    }

    /// Finds the cassette recording `run`.
    ///
    /// Scan ids match exactly; negative scan ids count back from the highest
    /// recorded scan id. Uids match exactly first, then by unique prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CassetteError::NotFound`] or [`CassetteError::Ambiguous`].
    pub fn find(&self, run: &RunRef) -> Result<&Cassette, CassetteError> {
        let not_found = || CassetteError::NotFound(run.to_string());
        match run {
            RunRef::ScanId(id) if *id < 0 => {
                let mut recorded: Vec<&Cassette> =
                    self.cassettes.iter().filter(|c| c.scan_id().is_some()).collect();
                recorded.sort_by_key(|c| std::cmp::Reverse(c.scan_id()));
                let back = usize::try_from(id.unsigned_abs() - 1).map_err(|_| not_found())?;
                recorded.get(back).copied().ok_or_else(not_found)
            }
            RunRef::ScanId(id) => self
                .cassettes
                .iter()
                .filter(|c| c.scan_id() == Some(*id))
                .max_by_key(|c| c.recorded_at)
                .ok_or_else(not_found),
            RunRef::Uid(uid) => {
                if let Some(exact) = self.cassettes.iter().find(|c| c.uid() == Some(uid.as_str())) {
                    return Ok(exact);
                }
                let matches: Vec<&Cassette> = self
                    .cassettes
                    .iter()
                    .filter(|c| c.uid().is_some_and(|u| u.starts_with(uid.as_str())))
                    .collect();
                match matches.as_slice() {
                    [] => Err(not_found()),
                    [one] => Ok(*one),
                    many => {
                        Err(CassetteError::Ambiguous { run: run.to_string(), count: many.len() })
                    }
                }
            }
        }
    }
}

fn read_cassette(path: &Path) -> Result<Cassette, CassetteError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| CassetteError::Read { path: path.to_path_buf(), source })?;
    serde_yaml::from_str(&content)
        .map_err(|source| CassetteError::Parse { path: path.to_path_buf(), source })
}
