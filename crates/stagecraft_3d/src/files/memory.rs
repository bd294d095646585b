//! In-memory file system

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{DirEntry, FileSystem, FsError, FsResult};

#[derive(Clone, Debug)]
enum Entry {
    File(Vec<u8>),
    Directory,
}

/// File system held in memory
///
/// Paths under a [denied](MemoryFs::deny) path fail with
/// [`FsError::PermissionDenied`] for every operation.
#[derive(Clone, Debug)]
pub struct MemoryFs {
    entries: BTreeMap<PathBuf, Entry>,
    denied: FxHashSet<PathBuf>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty file system with only `/`
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry::Directory);
        Self {
            entries,
            denied: FxHashSet::default(),
        }
    }

    /// Add a directory and its missing ancestors
    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.insert_ancestors(dir.as_ref());
        self.entries.insert(dir.as_ref().to_path_buf(), Entry::Directory);
        self
    }

    /// Add a file and its missing ancestors
    pub fn with_file(mut self, file: impl AsRef<Path>, contents: &[u8]) -> Self {
        self.insert_ancestors(file.as_ref());
        self.entries
            .insert(file.as_ref().to_path_buf(), Entry::File(contents.to_vec()));
        self
    }

    /// Deny access to `path` and everything below it
    pub fn deny(&mut self, path: impl Into<PathBuf>) {
        self.denied.insert(path.into());
    }

    pub fn allow(&mut self, path: &Path) {
        self.denied.remove(path);
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of files and directories, `/` included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    fn insert_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            self.entries
                .entry(ancestor.to_path_buf())
                .or_insert(Entry::Directory);
        }
    }

    fn check(&self, path: &Path) -> FsResult<()> {
        if path.ancestors().any(|p| self.denied.contains(p)) {
            return Err(FsError::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }

    fn require_dir(&self, dir: &Path) -> FsResult<()> {
        match self.entries.get(dir) {
            Some(Entry::Directory) => Ok(()),
            Some(Entry::File(_)) => Err(FsError::NotADirectory(dir.to_path_buf())),
            None => Err(FsError::NotFound(dir.to_path_buf())),
        }
    }

    fn require_parent(&self, path: &Path) -> FsResult<()> {
        match path.parent() {
            Some(parent) => self.require_dir(parent),
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }
}

impl FileSystem for MemoryFs {
    fn list(&self, dir: &Path) -> FsResult<Vec<DirEntry>> {
        self.check(dir)?;
        self.require_dir(dir)?;

        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .filter_map(|(path, entry)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(match entry {
                    Entry::File(_) => DirEntry::file(name),
                    Entry::Directory => DirEntry::directory(name),
                })
            })
            .collect();
        Ok(entries)
    }

    fn read(&self, file: &Path) -> FsResult<Vec<u8>> {
        self.check(file)?;
        match self.entries.get(file) {
            Some(Entry::File(contents)) => Ok(contents.clone()),
            Some(Entry::Directory) => Err(FsError::IsADirectory(file.to_path_buf())),
            None => Err(FsError::NotFound(file.to_path_buf())),
        }
    }

    fn write(&mut self, file: &Path, contents: &[u8]) -> FsResult<()> {
        self.check(file)?;
        self.require_parent(file)?;
        if let Some(Entry::Directory) = self.entries.get(file) {
            return Err(FsError::IsADirectory(file.to_path_buf()));
        }
        self.entries
            .insert(file.to_path_buf(), Entry::File(contents.to_vec()));
        Ok(())
    }

    fn create_dir(&mut self, dir: &Path) -> FsResult<()> {
        self.check(dir)?;
        match self.entries.get(dir) {
            Some(Entry::Directory) => return Ok(()),
            Some(Entry::File(_)) => return Err(FsError::NotADirectory(dir.to_path_buf())),
            None => {}
        }
        self.require_parent(dir)?;
        self.entries.insert(dir.to_path_buf(), Entry::Directory);
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> FsResult<()> {
        self.check(path)?;
        if path.parent().is_none() {
            return Err(FsError::PermissionDenied(path.to_path_buf()));
        }
        if self.entries.remove(path).is_none() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        self.entries.retain(|p, _| !p.starts_with(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_is_sorted_and_shallow() {
        let fs = MemoryFs::new()
            .with_file("/b.txt", b"")
            .with_file("/a/nested.txt", b"")
            .with_dir("/c");

        let names: Vec<_> = fs
            .list(Path::new("/"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b.txt", "c"]);
    }

    #[test]
    fn test_write_requires_parent() {
        let mut fs = MemoryFs::new();
        let err = fs.write(Path::new("/missing/file"), b"x").unwrap_err();
        assert!(matches!(err, FsError::NotFound(p) if p == Path::new("/missing")));
    }

    #[test]
    fn test_remove_directory_is_recursive() {
        let mut fs = MemoryFs::new().with_file("/a/b/c.txt", b"x").with_file("/ab.txt", b"y");
        fs.remove(Path::new("/a")).unwrap();
        assert!(!fs.exists(Path::new("/a/b/c.txt")));
        assert!(fs.exists(Path::new("/ab.txt")));
    }

    #[test]
    fn test_denied_subtree() {
        let mut fs = MemoryFs::new().with_file("/private/key", b"k");
        fs.deny("/private");
        assert!(matches!(
            fs.read(Path::new("/private/key")),
            Err(FsError::PermissionDenied(_))
        ));
        assert!(matches!(
            fs.remove(Path::new("/private/key")),
            Err(FsError::PermissionDenied(_))
        ));

        fs.allow(Path::new("/private"));
        assert_eq!(fs.read(Path::new("/private/key")).unwrap(), b"k");
    }

    #[test]
    fn test_create_dir_is_idempotent() {
        let mut fs = MemoryFs::new();
        fs.create_dir(Path::new("/d")).unwrap();
        fs.create_dir(Path::new("/d")).unwrap();
        assert_eq!(fs.len(), 2);
    }
}
