//! Configuration for dbtools.
//!
//! Read from `--config <path>`, else `<config dir>/dbtools/config.toml` when
//! present, else built-in defaults. Command-line flags override file values.
//!
//! ```toml
//! [server]
//! host = ".\\SQLEXPRESS"
//! sqlcmd = "sqlcmd"
//!
//! [scan]
//! extensions = ["vb", "cs"]
//! whole_word = false
//!
//! [backup]
//! directory = "D:\\backups"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DbToolsError, DbToolsResult};
use crate::parser::{ExtractPolicy, NameValidator, OutputRules};
use crate::scanner::{MatchMode, ScanOptions};
use crate::walker::{DEFAULT_EXCLUDE_DIRS, FileFilter};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Where statements are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `sqlcmd -S` target.
    #[serde(default = "default_host")]
    pub host: String,
    /// sqlcmd executable.
    #[serde(default = "default_sqlcmd")]
    pub sqlcmd: String,
    /// Native connection URL (`postgres://`, `mysql://`); replaces sqlcmd when set.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// Worker threads, 0 = one per core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub whole_word: bool,
}

/// How client output is parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
    #[serde(default = "default_system_databases")]
    pub system_databases: Vec<String>,
    /// Regex a row must match to count as a name.
    #[serde(default)]
    pub name_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub directory: PathBuf,
}

fn default_host() -> String {
    ".\\SQLEXPRESS".to_string()
}

fn default_sqlcmd() -> String {
    "sqlcmd".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["vb".to_string()]
}

fn default_exclude_dirs() -> Vec<String> {
    DEFAULT_EXCLUDE_DIRS.iter().map(|d| d.to_string()).collect()
}

fn default_header_lines() -> usize {
    2
}

fn default_system_databases() -> Vec<String> {
    OutputRules::default().system_databases
}

fn default_backup_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("backups")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            sqlcmd: default_sqlcmd(),
            url: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            threads: 0,
            whole_word: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            system_databases: default_system_databases(),
            name_pattern: None,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_backup_dir(),
        }
    }
}

impl ToolsConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> DbToolsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbToolsError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DbToolsError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> DbToolsResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DbToolsError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/dbtools/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dbtools").join("config.toml"))
    }

    /// Load `explicit` if given (it must exist), else the default file when it
    /// exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> DbToolsResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn output_rules(&self) -> DbToolsResult<OutputRules> {
        let validator = match &self.output.name_pattern {
            Some(pattern) => NameValidator::new(pattern)?,
            None => NameValidator::default(),
        };
        Ok(OutputRules {
            policy: ExtractPolicy::with_header_lines(self.output.header_lines),
            validator,
            system_databases: self.output.system_databases.clone(),
        })
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            filter: FileFilter::new(&self.scan.extensions)
                .exclude_dirs(self.scan.exclude_dirs.iter().cloned()),
            mode: if self.scan.whole_word {
                MatchMode::WholeWord
            } else {
                MatchMode::Substring
            },
            threads: self.scan.threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = ToolsConfig::default();
        assert_eq!(config.server.host, ".\\SQLEXPRESS");
        assert_eq!(config.server.sqlcmd, "sqlcmd");
        assert_eq!(config.scan.extensions, vec!["vb".to_string()]);
        assert_eq!(config.output.header_lines, 2);
        assert!(config.backup.directory.ends_with("backups"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ToolsConfig = toml::from_str(
            r#"
            [server]
            host = "db01"

            [scan]
            extensions = ["cs", "vb"]
            whole_word = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "db01");
        assert_eq!(config.server.sqlcmd, "sqlcmd");
        assert!(config.server.url.is_none());
        assert_eq!(config.scan.extensions, vec!["cs".to_string(), "vb".to_string()]);
        assert_eq!(config.scan.exclude_dirs.len(), DEFAULT_EXCLUDE_DIRS.len());
        assert_eq!(config.scan_options().mode, MatchMode::WholeWord);
        assert_eq!(
            config.output.system_databases,
            vec!["master", "model", "tempdb", "msdb"]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ToolsConfig::default();
        config.server.url = Some("postgres://localhost/app".to_string());
        config.output.header_lines = 3;
        config.save(&path).unwrap();

        let loaded = ToolsConfig::load(&path).unwrap();
        assert_eq!(loaded.server.url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(loaded.output.header_lines, 3);
        assert_eq!(loaded.output_rules().unwrap().policy.header_lines, 3);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ToolsConfig::load_or_default(Some(&dir.path().join("missing.toml")))
            .unwrap_err();
        assert!(matches!(err, DbToolsError::Config(_)));
    }

    #[test]
    fn test_bad_name_pattern() {
        let mut config = ToolsConfig::default();
        config.output.name_pattern = Some("([".to_string());
        assert!(config.output_rules().is_err());
    }
}
