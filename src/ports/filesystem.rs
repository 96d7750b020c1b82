//! Filesystem port for link materialization and export.

use std::path::Path;

/// Provides the filesystem operations the linker and exporter perform.
///
/// Abstracting the filesystem allows failures (permissions, races) to be
/// injected in tests without touching the real disk.
pub trait FileSystem: Send + Sync {
    /// Returns `true` if the path exists, following symlinks.
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` if a directory entry exists at the path, including a
    /// dangling symlink.
    fn entry_exists(&self, path: &Path) -> bool;

    /// Creates a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be created.
    fn create_dir_all(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Copies a regular file, overwriting the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the destination written.
    fn copy_file(
        &self,
        from: &Path,
        to: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Removes a file or symlink.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be removed.
    fn remove_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Creates a symlink at `link` pointing at `original`.
    ///
    /// # Errors
    ///
    /// Returns an error if `link` already exists or cannot be created.
    fn symlink(
        &self,
        original: &Path,
        link: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Writes the given contents to a file, creating parents and overwriting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (permissions, disk full, etc.).
    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
