//! Project file browser state
//!
//! Mirrors a project directory as a tree of names plus a map from relative
//! path (`models/box.glb`) to file-system path. The browser tracks the
//! directory being shown, the selected file and the file currently loaded in
//! the editor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{upload_folder, CopyStats, DirectoryPicker, EntryKind, FileSystem, FsResult};

/// A node of the project file tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileNode {
    File,
    Directory(BTreeMap<String, FileNode>),
}

#[derive(Debug)]
pub struct FileBrowser {
    root: PathBuf,
    tree: BTreeMap<String, FileNode>,
    files: BTreeMap<String, PathBuf>,
    dir: String,
    selected: Option<String>,
    current: Option<String>,
}

impl FileBrowser {
    /// Scan the project rooted at `root`
    pub fn open(fs: &dyn FileSystem, root: impl Into<PathBuf>) -> FsResult<Self> {
        let mut browser = Self {
            root: root.into(),
            tree: BTreeMap::new(),
            files: BTreeMap::new(),
            dir: String::new(),
            selected: None,
            current: None,
        };
        browser.refresh(fs)?;
        Ok(browser)
    }

    /// Rescan the project, keeping selection and current file if they survive
    pub fn refresh(&mut self, fs: &dyn FileSystem) -> FsResult<()> {
        let mut files = BTreeMap::new();
        let tree = scan(fs, &self.root, "", &mut files)?;
        self.tree = tree;
        self.files = files;

        if self.selected.as_ref().is_some_and(|s| !self.files.contains_key(s)) {
            self.selected = None;
        }
        if self.current.as_ref().is_some_and(|c| !self.files.contains_key(c)) {
            self.unload_file();
        }
        tracing::debug!(files = self.files.len(), "file tree refreshed");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self) -> &BTreeMap<String, FileNode> {
        &self.tree
    }

    /// Relative path to file-system path for every file
    pub fn files(&self) -> &BTreeMap<String, PathBuf> {
        &self.files
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.files.contains_key(relative)
    }

    /// Directory being shown, relative to the root (`""` for the root)
    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn set_dir(&mut self, relative: impl Into<String>) {
        self.dir = relative.into();
    }

    /// Select a file; unknown paths clear the selection
    pub fn select(&mut self, relative: &str) -> bool {
        let known = self.contains(relative);
        self.selected = known.then(|| relative.to_string());
        known
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Mark a file as loaded in the editor
    pub fn open_file(&mut self, relative: &str) -> bool {
        if !self.contains(relative) {
            return false;
        }
        self.current = Some(relative.to_string());
        true
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn unload_file(&mut self) -> Option<String> {
        let unloaded = self.current.take();
        if let Some(path) = &unloaded {
            tracing::debug!(path, "file unloaded");
        }
        unloaded
    }

    /// Delete the selected file
    ///
    /// The file is removed from the file system first; the tree and path map
    /// only change if that succeeds. A deleted current file is unloaded.
    /// Returns the deleted relative path.
    pub fn delete_selected(&mut self, fs: &mut dyn FileSystem) -> FsResult<Option<String>> {
        let Some(relative) = self.selected.clone() else {
            return Ok(None);
        };
        let Some(path) = self.files.get(&relative).cloned() else {
            self.selected = None;
            return Ok(None);
        };

        fs.remove(&path)?;

        let segments: Vec<&str> = relative.split('/').collect();
        unset(&mut self.tree, &segments);
        self.files.remove(&relative);
        self.selected = None;
        if self.current.as_deref() == Some(relative.as_str()) {
            self.unload_file();
        }

        tracing::info!(path = %relative, "file deleted");
        Ok(Some(relative))
    }

    /// Import a picked folder into the directory being shown
    pub fn upload(
        &mut self,
        picker: &mut dyn DirectoryPicker,
        source: &dyn FileSystem,
        fs: &mut dyn FileSystem,
    ) -> FsResult<CopyStats> {
        let destination = if self.dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.dir)
        };
        let stats = upload_folder(picker, source, fs, &destination)?;
        self.refresh(fs)?;
        Ok(stats)
    }
}

fn scan(
    fs: &dyn FileSystem,
    dir: &Path,
    prefix: &str,
    files: &mut BTreeMap<String, PathBuf>,
) -> FsResult<BTreeMap<String, FileNode>> {
    let mut tree = BTreeMap::new();
    for entry in fs.list(dir)? {
        let path = dir.join(&entry.name);
        let relative = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        let node = match entry.kind {
            EntryKind::File => {
                files.insert(relative, path);
                FileNode::File
            }
            EntryKind::Directory => FileNode::Directory(scan(fs, &path, &relative, files)?),
        };
        tree.insert(entry.name, node);
    }
    Ok(tree)
}

fn unset(tree: &mut BTreeMap<String, FileNode>, segments: &[&str]) {
    match segments {
        [] => {}
        [name] => {
            tree.remove(*name);
        }
        [name, rest @ ..] => {
            if let Some(FileNode::Directory(children)) = tree.get_mut(*name) {
                unset(children, rest);
            }
        }
    }
}
