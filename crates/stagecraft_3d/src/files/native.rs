//! File system rooted at a directory on disk

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::{DirEntry, FileSystem, FsError, FsResult};

/// Maps `/`-rooted paths onto a directory with `std::fs`
///
/// `..` components are dropped so nothing outside the root is reachable.
#[derive(Clone, Debug)]
pub struct NativeFs {
    root: PathBuf,
}

impl NativeFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        tracing::debug!(root = %root.display(), "native file system");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let mut full = self.root.clone();
        for component in path.components() {
            if let Component::Normal(part) = component {
                full.push(part);
            }
        }
        full
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FsError {
    match source.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_path_buf()),
        _ => FsError::Io {
            path: path.to_path_buf(),
            source,
        },
    }
}

impl FileSystem for NativeFs {
    fn list(&self, dir: &Path) -> FsResult<Vec<DirEntry>> {
        let full = self.resolve(dir);
        if full.is_file() {
            return Err(FsError::NotADirectory(dir.to_path_buf()));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&full).map_err(|e| io_error(dir, e))? {
            let entry = entry.map_err(|e| io_error(dir, e))?;
            let file_type = entry.file_type().map_err(|e| io_error(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if file_type.is_dir() {
                entries.push(DirEntry::directory(name));
            } else if file_type.is_file() {
                entries.push(DirEntry::file(name));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, file: &Path) -> FsResult<Vec<u8>> {
        let full = self.resolve(file);
        if full.is_dir() {
            return Err(FsError::IsADirectory(file.to_path_buf()));
        }
        std::fs::read(&full).map_err(|e| io_error(file, e))
    }

    fn write(&mut self, file: &Path, contents: &[u8]) -> FsResult<()> {
        let full = self.resolve(file);
        if full.is_dir() {
            return Err(FsError::IsADirectory(file.to_path_buf()));
        }
        std::fs::write(&full, contents).map_err(|e| io_error(file, e))
    }

    fn create_dir(&mut self, dir: &Path) -> FsResult<()> {
        let full = self.resolve(dir);
        match std::fs::create_dir(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if full.is_dir() {
                    Ok(())
                } else {
                    Err(FsError::NotADirectory(dir.to_path_buf()))
                }
            }
            Err(e) => Err(io_error(dir, e)),
        }
    }

    fn remove(&mut self, path: &Path) -> FsResult<()> {
        let full = self.resolve(path);
        if full == self.root {
            return Err(FsError::PermissionDenied(path.to_path_buf()));
        }
        let metadata = std::fs::symlink_metadata(&full).map_err(|e| io_error(path, e))?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(&full).map_err(|e| io_error(path, e))
        } else {
            std::fs::remove_file(&full).map_err(|e| io_error(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{copy_directory, MemoryFs};

    #[test]
    fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = NativeFs::new(dir.path());

        fs.create_dir(Path::new("/scenes")).unwrap();
        fs.write(Path::new("/scenes/main.json"), b"{}").unwrap();
        assert_eq!(fs.read(Path::new("/scenes/main.json")).unwrap(), b"{}");
        assert_eq!(
            fs.list(Path::new("/")).unwrap(),
            vec![DirEntry::directory("scenes")]
        );

        fs.remove(Path::new("/scenes")).unwrap();
        assert!(matches!(
            fs.read(Path::new("/scenes/main.json")),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_parent_components_stay_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        assert_eq!(fs.resolve(Path::new("/../../etc/passwd")), dir.path().join("etc/passwd"));
    }

    #[test]
    fn test_copy_from_memory_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = NativeFs::new(dir.path());
        let source = MemoryFs::new().with_file("/kit/textures/wood.png", b"png");

        copy_directory(&source, Path::new("/kit"), &mut fs, Path::new("/")).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("textures/wood.png")).unwrap(),
            b"png"
        );
    }
}
