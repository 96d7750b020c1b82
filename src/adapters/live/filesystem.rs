//! Live filesystem adapter using `std::fs`.

use std::path::Path;

use crate::ports::filesystem::FileSystem;

/// Live filesystem adapter backed by real disk I/O.
pub struct LiveFileSystem;

impl FileSystem for LiveFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn entry_exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn copy_file(
        &self,
        from: &Path,
        to: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        std::fs::copy(from, to)?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(std::fs::remove_file(path)?)
    }

    #[cfg(unix)]
    fn symlink(
        &self,
        original: &Path,
        link: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(std::os::unix::fs::symlink(original, link)?)
    }

    #[cfg(not(unix))]
    fn symlink(
        &self,
        _original: &Path,
        _link: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("symlinks are only supported on unix hosts".into())
    }

    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, contents)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn dangling_symlink_is_an_entry_but_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link.tif");
        let fs = LiveFileSystem;

        fs.symlink(&dir.path().join("missing.tif"), &link).unwrap();

        assert!(!fs.exists(&link));
        assert!(fs.entry_exists(&link));
        fs.remove_file(&link).unwrap();
        assert!(!fs.entry_exists(&link));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.csv");

        LiveFileSystem.write(&path, "x,y\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x,y\n");
    }
}
