//! File-system capability used by the editor's file browser
//!
//! Everything goes through the [`FileSystem`] trait: [`MemoryFs`] for tests
//! and sandboxes, [`NativeFs`] for a directory on disk. Paths are absolute
//! within the file system (`/models/box.glb`).

mod browser;
mod memory;
mod native;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use browser::{FileBrowser, FileNode};
pub use memory::MemoryFs;
pub use native::NativeFs;

/// File-system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("{0} not found")]
    NotFound(PathBuf),

    #[error("permission denied for {0}")]
    PermissionDenied(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{0} is a directory")]
    IsADirectory(PathBuf),

    #[error("directory pick cancelled")]
    Cancelled,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for file-system operations
pub type FsResult<T> = std::result::Result<T, FsError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// A file system the editor can browse and modify
pub trait FileSystem {
    /// Entries directly inside `dir`, sorted by name
    fn list(&self, dir: &Path) -> FsResult<Vec<DirEntry>>;

    fn read(&self, file: &Path) -> FsResult<Vec<u8>>;

    /// Create or replace a file; the parent directory must exist
    fn write(&mut self, file: &Path, contents: &[u8]) -> FsResult<()>;

    /// Create a directory; succeeds if it already exists
    fn create_dir(&mut self, dir: &Path) -> FsResult<()>;

    /// Remove a file, or a directory with everything in it
    fn remove(&mut self, path: &Path) -> FsResult<()>;
}

/// Asks the user for a directory to import
pub trait DirectoryPicker {
    /// The chosen directory, or [`FsError::Cancelled`]
    fn pick_directory(&mut self) -> FsResult<PathBuf>;
}

/// Counts from a [`copy_directory`] run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Recursively copy the contents of `from` into `to`
///
/// Directories are created on the destination as needed and existing files
/// are overwritten. The first failure aborts the copy and is returned;
/// whatever was copied before it stays.
pub fn copy_directory(
    source: &dyn FileSystem,
    from: &Path,
    destination: &mut dyn FileSystem,
    to: &Path,
) -> FsResult<CopyStats> {
    let mut stats = CopyStats::default();
    copy_into(source, from, destination, to, &mut stats)?;
    Ok(stats)
}

fn copy_into(
    source: &dyn FileSystem,
    from: &Path,
    destination: &mut dyn FileSystem,
    to: &Path,
    stats: &mut CopyStats,
) -> FsResult<()> {
    for entry in source.list(from)? {
        let src = from.join(&entry.name);
        let dst = to.join(&entry.name);
        match entry.kind {
            EntryKind::File => {
                let contents = source.read(&src)?;
                destination.write(&dst, &contents)?;
                stats.files += 1;
                stats.bytes += contents.len() as u64;
            }
            EntryKind::Directory => {
                destination.create_dir(&dst)?;
                stats.directories += 1;
                copy_into(source, &src, destination, &dst, stats)?;
            }
        }
    }
    Ok(())
}

/// Pick a directory from `source` and copy its contents into `to`
pub fn upload_folder(
    picker: &mut dyn DirectoryPicker,
    source: &dyn FileSystem,
    destination: &mut dyn FileSystem,
    to: &Path,
) -> FsResult<CopyStats> {
    let from = picker.pick_directory()?;
    tracing::debug!(from = %from.display(), to = %to.display(), "uploading folder");
    let stats = copy_directory(source, &from, destination, to)?;
    tracing::info!(files = stats.files, bytes = stats.bytes, "folder uploaded");
    Ok(stats)
}
