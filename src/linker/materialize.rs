//! Link materialization: turns plans into directories, scaffolds and symlinks.
//!
//! Plans are processed one at a time and independently. A failing plan is
//! recorded with its reason and the loop moves on.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::template::TemplateError;
use super::LinkPlan;
use crate::ports::FileSystem;

/// Filesystem step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsStage {
    /// Creating the destination's parent directory.
    CreateParent,
    /// Creating the analysis directory.
    CreateAnalysis,
    /// Copying an analysis template into a new analysis directory.
    SeedAnalysis,
    /// Removing an existing destination.
    RemoveExisting,
    /// Creating the symlink.
    Symlink,
}

impl fmt::Display for FsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateParent => "creating destination directory",
            Self::CreateAnalysis => "creating analysis directory",
            Self::SeedAnalysis => "seeding analysis directory",
            Self::RemoveExisting => "removing existing destination",
            Self::Symlink => "creating symlink",
        })
    }
}

/// Why a plan was not linked.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkFailure {
    /// The destination template could not be resolved.
    #[error("destination could not be resolved: {0}")]
    UnresolvedDestination(TemplateError),
    /// The source frame is not on disk.
    #[error("source file does not exist")]
    SourceMissing,
    /// A filesystem operation failed.
    #[error("{stage} failed: {message}")]
    Filesystem {
        /// The step that failed.
        stage: FsStage,
        /// Error reported by the filesystem.
        message: String,
    },
}

/// A plan that was not linked, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedLink {
    /// The plan.
    pub plan: LinkPlan,
    /// Why it failed.
    pub reason: LinkFailure,
}

/// Plans partitioned by outcome, each list in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Materialized {
    /// Plans whose destination now links to the source.
    pub linked: Vec<LinkPlan>,
    /// Plans that could not be linked.
    pub failed: Vec<FailedLink>,
}

/// Materializes every plan, in order.
///
/// For each plan: skip it if the source is missing; create the destination
/// directory; create and seed the analysis directory if it does not exist;
/// remove an existing destination when `overwrite` is set; then symlink.
/// Seeding copies each of `analysis_templates` into the new directory and is
/// keyed only on the directory's absence.
#[must_use]
pub fn materialize(
    fs: &dyn FileSystem,
    plans: Vec<LinkPlan>,
    analysis_templates: &[PathBuf],
    overwrite: bool,
) -> Materialized {
    let mut result = Materialized::default();

    for plan in plans {
        match link_one(fs, &plan, analysis_templates, overwrite) {
            Ok(destination) => {
                info!("Linked: {}", destination.display());
                result.linked.push(plan);
            }
            Err(reason) => {
                warn!(source = %plan.source.display(), %reason, "FAILED: {}", describe(&plan));
                result.failed.push(FailedLink { plan, reason });
            }
        }
    }
    result
}

fn link_one<'p>(
    fs: &dyn FileSystem,
    plan: &'p LinkPlan,
    analysis_templates: &[PathBuf],
    overwrite: bool,
) -> Result<&'p Path, LinkFailure> {
    let destination = plan
        .destination
        .as_deref()
        .map_err(|e| LinkFailure::UnresolvedDestination(e.clone()))?;

    if !fs.exists(&plan.source) {
        return Err(LinkFailure::SourceMissing);
    }

    if let Some(parent) = destination.parent() {
        fs.create_dir_all(parent).map_err(fs_error(FsStage::CreateParent))?;
    }

    if !fs.exists(&plan.analysis_dir) {
        fs.create_dir_all(&plan.analysis_dir).map_err(fs_error(FsStage::CreateAnalysis))?;
        seed_analysis(fs, &plan.analysis_dir, analysis_templates)?;
    }

    if overwrite && fs.entry_exists(destination) {
        fs.remove_file(destination).map_err(fs_error(FsStage::RemoveExisting))?;
    }

    fs.symlink(&plan.source, destination).map_err(fs_error(FsStage::Symlink))?;
    Ok(destination)
}

fn seed_analysis(
    fs: &dyn FileSystem,
    analysis_dir: &Path,
    templates: &[PathBuf],
) -> Result<(), LinkFailure> {
    for template in templates {
        let Some(name) = template.file_name() else {
            continue;
        };
        fs.copy_file(template, &analysis_dir.join(name)).map_err(fs_error(FsStage::SeedAnalysis))?;
    }
    info!(dir = %analysis_dir.display(), templates = templates.len(), "seeded analysis directory");
    Ok(())
}

fn fs_error(
    stage: FsStage,
) -> impl FnOnce(Box<dyn std::error::Error + Send + Sync>) -> LinkFailure {
    move |err| LinkFailure::Filesystem { stage, message: err.to_string() }
}

fn describe(plan: &LinkPlan) -> String {
    plan.destination_path()
        .map_or_else(|| "<unresolved destination>".to_string(), |d| d.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::live::filesystem::LiveFileSystem;
    use std::sync::Mutex;

    struct Scratch {
        dir: tempfile::TempDir,
    }

    impl Scratch {
        fn new() -> Self {
            Self { dir: tempfile::tempdir().unwrap() }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn frame(&self, name: &str) -> PathBuf {
            let path = self.path(&format!("raw/{name}"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, name).unwrap();
            path
        }

        fn templates(&self) -> Vec<PathBuf> {
            ["SAXS_template.ipynb", "WAXS_template.ipynb"]
                .iter()
                .map(|name| {
                    let path = self.path(&format!("templates/{name}"));
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    std::fs::write(&path, "{}").unwrap();
                    path
                })
                .collect()
        }

        fn plan(&self, source: PathBuf, dest: &str) -> LinkPlan {
            LinkPlan {
                run_uid: "uid-1".into(),
                source,
                destination: Ok(self.path(&format!("user_data/{dest}"))),
                analysis_dir: self.path("analysis"),
            }
        }
    }

    #[test]
    fn links_existing_sources_and_seeds_analysis_once() {
        let s = Scratch::new();
        let templates = s.templates();
        let plans = vec![
            s.plan(s.frame("a_000000.tif"), "1M/a_000000_SAXS.tif"),
            s.plan(s.frame("a_000001.tif"), "1M/a_000001_SAXS.tif"),
        ];

        let out = materialize(&LiveFileSystem, plans, &templates, true);

        assert_eq!(out.linked.len(), 2);
        assert!(out.failed.is_empty());
        for plan in &out.linked {
            let dest = plan.destination_path().unwrap();
            assert_eq!(std::fs::read_link(dest).unwrap(), plan.source);
            assert_eq!(
                std::fs::read_to_string(dest).unwrap(),
                std::fs::read_to_string(&plan.source).unwrap()
            );
        }
        assert!(s.path("analysis/SAXS_template.ipynb").exists());
        assert!(s.path("analysis/WAXS_template.ipynb").exists());
    }

    #[test]
    fn missing_sources_fail_without_stopping_the_batch() {
        let s = Scratch::new();
        let plans = vec![
            s.plan(s.path("raw/missing_0.tif"), "x/0.tif"),
            s.plan(s.frame("present.tif"), "x/1.tif"),
            s.plan(s.path("raw/missing_2.tif"), "x/2.tif"),
        ];

        let out = materialize(&LiveFileSystem, plans, &[], true);

        assert_eq!(out.linked.len(), 1);
        assert_eq!(out.failed.len(), 2);
        assert!(out.failed.iter().all(|f| f.reason == LinkFailure::SourceMissing));
        assert!(!s.path("user_data/x/0.tif").exists());
    }

    #[test]
    fn rerun_with_overwrite_is_idempotent() {
        let s = Scratch::new();
        let plans = vec![
            s.plan(s.frame("f0.tif"), "d/f0.tif"),
            s.plan(s.path("raw/gone.tif"), "d/gone.tif"),
        ];

        let first = materialize(&LiveFileSystem, plans.clone(), &[], true);
        let second = materialize(&LiveFileSystem, plans, &[], true);

        assert_eq!(first.linked, second.linked);
        assert_eq!(first.failed, second.failed);
        assert_eq!(second.linked.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_replaces_dangling_destination() {
        let s = Scratch::new();
        let source = s.frame("f0.tif");
        let dest = s.path("user_data/d/f0.tif");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(s.path("raw/deleted.tif"), &dest).unwrap();
        assert!(!dest.exists());

        let plans = vec![s.plan(source.clone(), "d/f0.tif")];
        let out = materialize(&LiveFileSystem, plans, &[], true);

        assert_eq!(out.linked.len(), 1);
        assert!(out.failed.is_empty());
        assert_eq!(std::fs::read_link(&dest).unwrap(), source);
    }

    #[test]
    fn existing_destination_without_overwrite_fails_at_symlink() {
        let s = Scratch::new();
        let plans = vec![s.plan(s.frame("f0.tif"), "d/f0.tif")];

        let _ = materialize(&LiveFileSystem, plans.clone(), &[], false);
        let again = materialize(&LiveFileSystem, plans, &[], false);

        assert!(again.linked.is_empty());
        assert!(matches!(
            again.failed[0].reason,
            LinkFailure::Filesystem { stage: FsStage::Symlink, .. }
        ));
    }

    #[test]
    fn unresolved_destination_fails_only_that_plan() {
        let s = Scratch::new();
        let mut broken = s.plan(s.frame("f0.tif"), "unused");
        broken.destination = Err(TemplateError::Unresolved(vec!["energy".into()]));
        let plans = vec![broken, s.plan(s.frame("f1.tif"), "d/f1.tif")];

        let out = materialize(&LiveFileSystem, plans, &[], true);

        assert_eq!(out.linked.len(), 1);
        assert!(matches!(out.failed[0].reason, LinkFailure::UnresolvedDestination(_)));
    }

    /// Real filesystem whose symlink calls fail for chosen destinations.
    struct FlakyFileSystem {
        refuse: Vec<PathBuf>,
        attempts: Mutex<Vec<PathBuf>>,
    }

    impl FileSystem for FlakyFileSystem {
        fn exists(&self, path: &Path) -> bool {
            LiveFileSystem.exists(path)
        }
        fn entry_exists(&self, path: &Path) -> bool {
            LiveFileSystem.entry_exists(path)
        }
        fn create_dir_all(
            &self,
            path: &Path,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            LiveFileSystem.create_dir_all(path)
        }
        fn copy_file(
            &self,
            from: &Path,
            to: &Path,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            LiveFileSystem.copy_file(from, to)
        }
        fn remove_file(
            &self,
            path: &Path,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            LiveFileSystem.remove_file(path)
        }
        fn symlink(
            &self,
            original: &Path,
            link: &Path,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.attempts.lock().unwrap().push(link.to_path_buf());
            if self.refuse.iter().any(|p| p == link) {
                return Err("permission denied".into());
            }
            LiveFileSystem.symlink(original, link)
        }
        fn write(
            &self,
            path: &Path,
            contents: &str,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            LiveFileSystem.write(path, contents)
        }
    }

    #[test]
    fn filesystem_errors_are_recorded_per_plan() {
        let s = Scratch::new();
        let refused = s.path("user_data/d/f1.tif");
        let fs =
            FlakyFileSystem { refuse: vec![refused.clone()], attempts: Mutex::new(Vec::new()) };
        let plans = vec![
            s.plan(s.frame("f0.tif"), "d/f0.tif"),
            s.plan(s.frame("f1.tif"), "d/f1.tif"),
            s.plan(s.frame("f2.tif"), "d/f2.tif"),
        ];

        let out = materialize(&fs, plans, &[], true);

        assert_eq!(out.linked.len(), 2);
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].plan.destination_path(), Some(refused.as_path()));
        assert_eq!(
            out.failed[0].reason,
            LinkFailure::Filesystem { stage: FsStage::Symlink, message: "permission denied".into() }
        );
        assert_eq!(fs.attempts.lock().unwrap().len(), 3);
    }

    #[test]
    fn missing_analysis_template_fails_the_seeding_plan() {
        let s = Scratch::new();
        let plans = vec![s.plan(s.frame("f0.tif"), "d/f0.tif")];

        let out = materialize(&LiveFileSystem, plans, &[s.path("templates/absent.ipynb")], true);

        assert!(matches!(
            out.failed[0].reason,
            LinkFailure::Filesystem { stage: FsStage::SeedAnalysis, .. }
        ));
    }
}
