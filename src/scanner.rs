//! Stored procedure usage scanner.
//!
//! Cross-references a list of procedure names against source files and
//! reports, per file, which names occur in its text. All names are compiled
//! into one Aho-Corasick automaton so every file is read and searched once.
//! Files are processed in parallel on a rayon pool; the indexed collect keeps
//! the report in input file order.

use aho_corasick::{AhoCorasick, MatchKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DbToolsError, DbToolsResult};
use crate::report::{FileError, MatchResult, ProcedureName, ScanOutcome, ScanReport};
use crate::walker::{FileFilter, enumerate_files};

/// Cooperative cancellation handle shared between a scan and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Checked before each file.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How an occurrence of a name is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Plain, case-sensitive substring.
    #[default]
    Substring,
    /// Substring not preceded or followed by `[A-Za-z0-9_]`.
    WholeWord,
}

/// Options for [`scan_directory`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub filter: FileFilter,
    pub mode: MatchMode,
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
}

enum FileScan {
    Done(Vec<ProcedureName>),
    Failed(FileError),
    Cancelled,
}

/// Matches a fixed procedure list against file contents.
pub struct UsageScanner {
    names: Vec<ProcedureName>,
    automaton: Option<AhoCorasick>,
    mode: MatchMode,
    threads: usize,
}

impl UsageScanner {
    /// Build a scanner. Empty names are ignored and duplicates collapse to
    /// their first occurrence, so each name is reported at most once per file.
    pub fn new(names: &[ProcedureName], mode: MatchMode) -> DbToolsResult<Self> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut unique = Vec::with_capacity(names.len());
        for name in names {
            if !name.is_empty() && seen.insert(name.as_str()) {
                unique.push(name.clone());
            }
        }
        let names = unique;

        let automaton = if names.is_empty() {
            None
        } else {
            let ac = AhoCorasick::builder()
                .match_kind(MatchKind::Standard)
                .build(names.iter().map(|n| n.as_str()))
                .map_err(|e| DbToolsError::Config(format!("Cannot build matcher: {}", e)))?;
            Some(ac)
        };

        Ok(Self {
            names,
            automaton,
            mode,
            threads: 0,
        })
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// The de-duplicated procedure list, in match order.
    pub fn procedures(&self) -> &[ProcedureName] {
        &self.names
    }

    /// Names occurring in `haystack`, in procedure-list order.
    pub fn match_bytes(&self, haystack: &[u8]) -> Vec<ProcedureName> {
        let Some(ac) = &self.automaton else {
            return Vec::new();
        };

        let mut found = vec![false; self.names.len()];
        let mut remaining = self.names.len();
        for m in ac.find_overlapping_iter(haystack) {
            let idx = m.pattern().as_usize();
            if found[idx] {
                continue;
            }
            if self.mode == MatchMode::WholeWord && !is_word_bounded(haystack, m.start(), m.end()) {
                continue;
            }
            found[idx] = true;
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }

        self.names
            .iter()
            .zip(found)
            .filter(|(_, hit)| *hit)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Read one file and match it.
    pub fn scan_file(&self, path: &Path) -> DbToolsResult<Vec<ProcedureName>> {
        let content = std::fs::read(path).map_err(|e| DbToolsError::file_unreadable(path, e))?;
        Ok(self.match_bytes(&content))
    }

    /// Scan `files` and assemble the report rooted at `root`.
    ///
    /// Unreadable files are recorded in [`ScanOutcome::skipped`]. Returns
    /// [`DbToolsError::Cancelled`] when `cancel` trips before every file has
    /// been processed.
    pub fn scan(
        &self,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancelFlag,
    ) -> DbToolsResult<ScanOutcome> {
        let mut outcome = ScanOutcome {
            report: ScanReport::new(root),
            skipped: Vec::new(),
        };

        if self.automaton.is_none() {
            tracing::info!(root = %root.display(), "empty procedure list, nothing to match");
            return Ok(outcome);
        }

        let results = if self.threads == 0 {
            self.scan_all(files, cancel)
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| DbToolsError::Config(format!("Cannot start scan workers: {}", e)))?;
            pool.install(|| self.scan_all(files, cancel))
        };

        for (path, result) in files.iter().zip(results) {
            match result {
                FileScan::Done(procedures) => {
                    outcome.report.push(MatchResult::new(root, path, procedures));
                }
                FileScan::Failed(err) => outcome.skipped.push(err),
                FileScan::Cancelled => return Err(DbToolsError::Cancelled),
            }
        }

        tracing::info!(
            root = %root.display(),
            files = files.len(),
            matched = outcome.report.file_count(),
            skipped = outcome.skipped.len(),
            "scan complete"
        );
        Ok(outcome)
    }

    fn scan_all(&self, files: &[PathBuf], cancel: &CancelFlag) -> Vec<FileScan> {
        files
            .par_iter()
            .map(|path| {
                if cancel.is_cancelled() {
                    return FileScan::Cancelled;
                }
                match self.scan_file(path) {
                    Ok(procedures) => {
                        tracing::debug!(
                            path = %path.display(),
                            matches = procedures.len(),
                            "scanned file"
                        );
                        FileScan::Done(procedures)
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping unreadable file"
                        );
                        FileScan::Failed(FileError {
                            path: path.clone(),
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    }
}

/// Enumerate files under `root` and scan them for `names`.
pub fn scan_directory(
    root: &Path,
    names: &[ProcedureName],
    options: &ScanOptions,
    cancel: &CancelFlag,
) -> DbToolsResult<ScanOutcome> {
    let files = enumerate_files(root, &options.filter)?;
    UsageScanner::new(names, options.mode)?
        .with_threads(options.threads)
        .scan(root, &files, cancel)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_bounded(haystack: &[u8], start: usize, end: usize) -> bool {
    let before = start
        .checked_sub(1)
        .map(|i| is_word_byte(haystack[i]))
        .unwrap_or(false);
    let after = haystack.get(end).copied().map(is_word_byte).unwrap_or(false);
    !before && !after
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<ProcedureName> {
        list.iter().map(|s| ProcedureName::from(*s)).collect()
    }

    fn matcher(list: &[&str]) -> UsageScanner {
        UsageScanner::new(&names(list), MatchMode::Substring).unwrap()
    }

    #[test]
    fn test_name_reported_once() {
        let got = matcher(&["GetUser"]).match_bytes(b"GetUser(); GetUser();");
        assert_eq!(got, names(&["GetUser"]));
    }

    #[test]
    fn test_no_match() {
        assert!(matcher(&["GetUser"]).match_bytes(b"nothing here").is_empty());
    }

    #[test]
    fn test_list_order_not_file_order() {
        let got = matcher(&["B", "A"]).match_bytes(b"A then B");
        assert_eq!(got, names(&["B", "A"]));
    }

    #[test]
    fn test_overlapping_names_all_found() {
        let got = matcher(&["usp_GetUserById", "usp_GetUser", "GetUser"])
            .match_bytes(b"cmd.CommandText = \"usp_GetUserById\"");
        assert_eq!(got, names(&["usp_GetUserById", "usp_GetUser", "GetUser"]));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(matcher(&["GetUser"]).match_bytes(b"getuser").is_empty());
    }

    #[test]
    fn test_duplicates_and_empty_names_collapse() {
        let scanner = matcher(&["A", "", "B", "A"]);
        assert_eq!(scanner.procedures(), names(&["A", "B"]).as_slice());
        assert_eq!(scanner.match_bytes(b"AB"), names(&["A", "B"]));
    }

    #[test]
    fn test_whole_word_mode() {
        let scanner =
            UsageScanner::new(&names(&["usp_Get", "usp_Save"]), MatchMode::WholeWord).unwrap();
        let got = scanner.match_bytes(b"Exec(\"usp_GetAll\"); Exec(\"usp_Save\")");
        assert_eq!(got, names(&["usp_Save"]));
        // A later bounded occurrence still counts.
        let got = scanner.match_bytes(b"usp_GetAll usp_Get");
        assert_eq!(got, names(&["usp_Get"]));
    }

    #[test]
    fn test_word_bounds_at_edges() {
        assert!(is_word_bounded(b"abc", 0, 3));
        assert!(!is_word_bounded(b"xabc", 1, 4));
        assert!(!is_word_bounded(b"abc_", 0, 3));
        assert!(is_word_bounded(b"(abc)", 1, 4));
    }

    #[test]
    fn test_non_utf8_content_is_matched() {
        let got = matcher(&["usp_Get"]).match_bytes(b"\xff\xfe usp_Get \x80");
        assert_eq!(got, names(&["usp_Get"]));
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_scan_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.vb");
        std::fs::write(&file, "usp_Get").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = matcher(&["usp_Get"])
            .scan(dir.path(), &[file], &cancel)
            .unwrap_err();
        assert!(matches!(err, DbToolsError::Cancelled));
    }

    #[test]
    fn test_empty_list_gives_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.vb");
        std::fs::write(&file, "usp_Get").unwrap();

        let outcome = matcher(&[])
            .scan(dir.path(), &[file], &CancelFlag::new())
            .unwrap();
        assert!(outcome.report.is_empty());
        assert!(outcome.skipped.is_empty());
    }
}
