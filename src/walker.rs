//! Source file discovery.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{DbToolsError, DbToolsResult};

/// Directories never descended into.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    "bin",
    "obj",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "__pycache__",
];

/// Which files a walk picks up.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
    exclude_dirs: Vec<String>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(["vb"])
    }
}

impl FileFilter {
    /// Filter on the given extensions (leading dot optional, case-insensitive).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn exclude_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// True when `path` carries one of the configured extensions.
    /// An empty extension list accepts every file.
    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| self.exclude_dirs.iter().any(|d| d == name))
                .unwrap_or(false)
    }
}

/// Regular files, and symlinks resolving to one. Directory links are not
/// followed.
fn is_source_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

/// Recursively list files under `root` accepted by `filter`, sorted by path.
///
/// Fails with [`DbToolsError::InputUnavailable`] when `root` is missing, not
/// a directory, or cannot be listed. Unreadable entries below the root are
/// logged and skipped.
pub fn enumerate_files(root: &Path, filter: &FileFilter) -> DbToolsResult<Vec<PathBuf>> {
    let metadata =
        std::fs::metadata(root).map_err(|e| DbToolsError::input_unavailable(root, e))?;
    if !metadata.is_dir() {
        return Err(DbToolsError::input_unavailable(root, "not a directory"));
    }
    std::fs::read_dir(root).map_err(|e| DbToolsError::input_unavailable(root, e))?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !filter.is_excluded_dir(e));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if is_source_file(&entry) && filter.matches(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = ?e.path().map(Path::display),
                    error = %e,
                    "skipping unreadable entry"
                );
            }
        }
    }

    files.sort();
    tracing::debug!(root = %root.display(), files = files.len(), "enumerated source files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn relative(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_recursive_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.vb");
        touch(dir.path(), "a/z.vb");
        touch(dir.path(), "a/notes.txt");
        touch(dir.path(), "c/d/e.VB");

        let files = enumerate_files(dir.path(), &FileFilter::default()).unwrap();
        assert_eq!(relative(dir.path(), &files), vec!["a/z.vb", "b.vb", "c/d/e.VB"]);
    }

    #[test]
    fn test_excluded_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/Main.vb");
        touch(dir.path(), "obj/Debug/Main.vb");
        touch(dir.path(), ".git/hooks/x.vb");

        let files = enumerate_files(dir.path(), &FileFilter::default()).unwrap();
        assert_eq!(relative(dir.path(), &files), vec!["src/Main.vb"]);
    }

    #[test]
    fn test_multiple_extensions_with_dots() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.cs");
        touch(dir.path(), "b.vb");
        touch(dir.path(), "c.sql");

        let filter = FileFilter::new([".cs", "VB"]);
        let files = enumerate_files(dir.path(), &filter).unwrap();
        assert_eq!(relative(dir.path(), &files), vec!["a.cs", "b.vb"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "shared/Real.vb");
        std::os::unix::fs::symlink(
            dir.path().join("shared/Real.vb"),
            dir.path().join("Link.vb"),
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path().join("shared"), dir.path().join("linked_dir"))
            .unwrap();

        let files = enumerate_files(dir.path(), &FileFilter::default()).unwrap();
        assert_eq!(relative(dir.path(), &files), vec!["Link.vb", "shared/Real.vb"]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = enumerate_files(&missing, &FileFilter::default()).unwrap_err();
        assert!(matches!(err, DbToolsError::InputUnavailable { .. }));
    }

    #[test]
    fn test_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "single.vb");
        let err = enumerate_files(&dir.path().join("single.vb"), &FileFilter::default())
            .unwrap_err();
        assert!(matches!(err, DbToolsError::InputUnavailable { .. }));
    }
}
