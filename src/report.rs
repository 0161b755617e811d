//! Scan results: which files reference which stored procedures.

use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A stored procedure name. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureName(String);

impl ProcedureName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ProcedureName {
    fn from(v: &str) -> Self {
        ProcedureName(v.to_string())
    }
}

impl From<String> for ProcedureName {
    fn from(v: String) -> Self {
        ProcedureName(v)
    }
}

impl AsRef<str> for ProcedureName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcedureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Procedures referenced by one source file, in procedure-list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Absolute path of the file.
    pub file: PathBuf,
    /// Path relative to the scan root, used as the display label.
    pub relative: String,
    pub procedures: Vec<ProcedureName>,
}

impl MatchResult {
    pub fn new(root: &Path, file: &Path, procedures: Vec<ProcedureName>) -> Self {
        Self {
            relative: relative_label(root, file),
            file: file.to_path_buf(),
            procedures,
        }
    }
}

/// Aggregate result of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub entries: Vec<MatchResult>,
}

impl ScanReport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    /// Append a file result. Results without matches are dropped.
    pub fn push(&mut self, result: MatchResult) {
        if !result.procedures.is_empty() {
            self.entries.push(result);
        }
    }

    /// Number of files with at least one match.
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry for a path relative to the root.
    pub fn get(&self, relative: &str) -> Option<&MatchResult> {
        self.entries.iter().find(|e| e.relative == relative)
    }

    /// Render the report as an indented tree:
    ///
    /// ```text
    /// /src/app
    /// ├── Data/Orders.vb
    /// │   ├── usp_GetOrder
    /// │   └── usp_SaveOrder
    /// └── Forms/Main.vb
    ///     └── usp_GetUser
    /// ```
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.root.display().to_string().cyan().bold().to_string());
        out.push('\n');

        let last_entry = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter().enumerate() {
            let (branch, indent) = if i == last_entry {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            out.push_str(&format!("{}{}\n", branch.dimmed(), entry.relative.white()));

            let last_proc = entry.procedures.len().saturating_sub(1);
            for (j, name) in entry.procedures.iter().enumerate() {
                let leaf = if j == last_proc { "└── " } else { "├── " };
                out.push_str(&format!(
                    "{}{}{}\n",
                    indent.dimmed(),
                    leaf.dimmed(),
                    name.as_str().yellow()
                ));
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A file skipped during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// Report plus the files that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub skipped: Vec<FileError>,
}

fn relative_label(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .display()
        .to_string()
}
