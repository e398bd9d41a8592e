use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::report::{Event, Reporter};

fn pruned_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.\.?(svn)?$").expect("pruned dir regex"))
}

fn skipped_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.?\.?(\.swp)?(\.ignore)?$").expect("skipped file regex"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    dirs: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl FileTree {
    pub fn insert_dir(&mut self, dir: &str) {
        if self.index.contains_key(dir) {
            return;
        }
        self.index.insert(dir.to_string(), self.dirs.len());
        self.dirs.push((dir.to_string(), Vec::new()));
    }

    pub fn push_file(&mut self, dir: &str, name: &str) {
        self.insert_dir(dir);
        let i = self.index[dir];
        self.dirs[i].1.push(name.to_string());
    }

    #[cfg(test)]
    pub(crate) fn files(&self, dir: &str) -> Option<&[String]> {
        self.index.get(dir).map(|&i| self.dirs[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.dirs.iter().map(|(d, f)| (d.as_str(), f.as_slice()))
    }

    #[cfg(test)]
    pub(crate) fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(|(d, _)| d.as_str())
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

fn is_pruned(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| pruned_dir_re().is_match(n))
}

// "/usr/bin" for "<root>/usr/bin"; empty for the root itself.
fn install_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| Error::fs(format!("strip_prefix failed for {}: {e}", path.display())))?;
    let mut out = String::new();
    for c in rel.components() {
        let Component::Normal(seg) = c else {
            continue;
        };
        let seg = seg
            .to_str()
            .ok_or_else(|| Error::fs(format!("non UTF-8 path in staged root: {}", path.display())))?;
        out.push('/');
        out.push_str(seg);
    }
    Ok(out)
}

/// Walks `root` depth-first (entries sorted by name) into a [`FileTree`].
///
/// `.`/`..`/`.svn` directories are pruned with their subtrees; empty,
/// `.swp` and `.ignore` file names are dropped. Fails when the staged root is
/// missing or yields no directories.
pub fn scan(root: &Path, reporter: &dyn Reporter) -> Result<FileTree> {
    if !root.is_dir() {
        return Err(Error::fs(format!(
            "staged root {} does not exist or is not a directory",
            root.display()
        )));
    }

    let mut tree = FileTree::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_pruned(e));
    for entry in walker {
        let entry = entry.map_err(|e| Error::fs(format!("walkdir error: {e}")))?;
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        if entry.file_type().is_dir() {
            tree.insert_dir(&install_path(root, path)?);
            continue;
        }

        let name = entry.file_name().to_str().ok_or_else(|| {
            Error::fs(format!("non UTF-8 file name in staged root: {}", path.display()))
        })?;
        if skipped_file_re().is_match(name) {
            continue;
        }
        if entry.depth() == 1 {
            // Nothing in %files can own a file that sits directly in "/".
            reporter.emit(Event::SkippedEntry {
                path: format!("/{name}"),
                reason: "file directly under the staged root".into(),
            });
            continue;
        }
        let parent = path.parent().unwrap_or(root);
        tree.push_file(&install_path(root, parent)?, name);
    }

    if tree.is_empty() {
        return Err(Error::fs(format!(
            "could not build file tree from staged root: {}",
            root.display()
        )));
    }
    Ok(tree)
}
