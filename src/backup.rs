//! Backup and restore.
//!
//! Backups are written as `<db>_<yyyyMMddHHmm>.bak` and recorded in a
//! `dbtools-manifest.json` next to them. A restore looks the file up in the
//! manifest to learn which database it belongs to.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::DatabaseClient;
use crate::error::{DbToolsError, DbToolsResult};
use crate::parser::status_line;
use crate::transpiler::Statement;

pub const MANIFEST_FILE: &str = "dbtools-manifest.json";

/// `<db>_<yyyyMMddHHmm>.bak`
pub fn backup_file_name(database: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.bak", database, now.format("%Y%m%d%H%M"))
}

/// One backup written by dbtools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// File name inside the backup directory.
    pub file: String,
    pub database: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backups: Vec<BackupRecord>,
}

impl BackupManifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Load the manifest of `dir`. A missing manifest is empty.
    pub fn load(dir: &Path) -> DbToolsResult<Self> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, dir: &Path) -> DbToolsResult<()> {
        std::fs::write(Self::path(dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Add a record, replacing any previous record for the same file.
    pub fn record(&mut self, record: BackupRecord) {
        self.backups.retain(|b| b.file != record.file);
        self.backups.push(record);
    }

    pub fn lookup(&self, file: &str) -> Option<&BackupRecord> {
        self.backups.iter().find(|b| b.file == file)
    }
}

/// Result of a backup or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminOutcome {
    pub database: String,
    pub path: PathBuf,
    /// Last non-empty output line of the client.
    pub status: Option<String>,
}

/// Back up `database` into `dir` and record it in the manifest.
pub async fn backup_database<C: DatabaseClient>(
    client: &C,
    host: &str,
    database: &str,
    dir: &Path,
    now: DateTime<Local>,
) -> DbToolsResult<AdminOutcome> {
    std::fs::create_dir_all(dir)?;
    let dir = std::path::absolute(dir)?;

    let file = backup_file_name(database, now);
    let path = dir.join(&file);
    tracing::info!(database, path = %path.display(), "backing up");

    let output = client
        .run(
            None,
            &Statement::Backup {
                database,
                path: &path,
            },
        )
        .await?;

    let mut manifest = BackupManifest::load(&dir)?;
    manifest.record(BackupRecord {
        file,
        database: database.to_string(),
        host: host.to_string(),
        created_at: now.with_timezone(&Utc),
    });
    manifest.save(&dir)?;

    Ok(AdminOutcome {
        database: database.to_string(),
        path,
        status: status_line(&output),
    })
}

/// Find the database a backup file belongs to.
///
/// When `expected` is given the recorded database must match it.
pub fn resolve_restore_target(file: &Path, expected: Option<&str>) -> DbToolsResult<BackupRecord> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DbToolsError::RestoreFile("restore file not selected".to_string()))?;

    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let manifest = BackupManifest::load(&dir)?;
    let record = manifest.lookup(&name).cloned().ok_or_else(|| {
        DbToolsError::RestoreFile(format!(
            "{} is not listed in {}",
            name,
            BackupManifest::path(&dir).display()
        ))
    })?;

    if let Some(db) = expected
        && db != record.database
    {
        return Err(DbToolsError::RestoreFile(format!(
            "wrong restore file selected: {} is a backup of {}, not {}",
            name, record.database, db
        )));
    }

    Ok(record)
}

/// Restore the database recorded for `file`.
pub async fn restore_database<C: DatabaseClient>(
    client: &C,
    file: &Path,
    expected: Option<&str>,
) -> DbToolsResult<AdminOutcome> {
    let record = resolve_restore_target(file, expected)?;
    let path = std::path::absolute(file)?;
    tracing::info!(database = %record.database, path = %path.display(), "restoring");

    let output = client
        .run(
            None,
            &Statement::Restore {
                database: &record.database,
                path: &path,
            },
        )
        .await?;

    Ok(AdminOutcome {
        database: record.database,
        path,
        status: status_line(&output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::ScriptedClient;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 12, 7, 0).unwrap()
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(backup_file_name("Sales", noon()), "Sales_202403051207.bak");
    }

    #[test]
    fn test_manifest_record_replaces_same_file() {
        let mut manifest = BackupManifest::default();
        let record = BackupRecord {
            file: "Sales_202403051207.bak".to_string(),
            database: "Sales".to_string(),
            host: "a".to_string(),
            created_at: noon().with_timezone(&Utc),
        };
        manifest.record(record.clone());
        manifest.record(BackupRecord {
            host: "b".to_string(),
            ..record
        });
        assert_eq!(manifest.backups.len(), 1);
        assert_eq!(manifest.lookup("Sales_202403051207.bak").unwrap().host, "b");
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("backups");
        let client = ScriptedClient::new(&[
            "Processed 360 pages.",
            "BACKUP DATABASE successfully processed.",
            "",
        ]);

        let outcome = backup_database(&client, "localhost", "Sales", &out, noon())
            .await
            .unwrap();
        assert!(out.join(MANIFEST_FILE).is_file());
        assert!(outcome.path.ends_with("Sales_202403051207.bak"));
        assert_eq!(
            outcome.status.as_deref(),
            Some("BACKUP DATABASE successfully processed.")
        );
        assert!(client.statements()[0].starts_with("BACKUP DATABASE [Sales] TO DISK='"));

        let restored = restore_database(&client, &outcome.path, Some("Sales"))
            .await
            .unwrap();
        assert_eq!(restored.database, "Sales");
        assert!(client.statements()[1].starts_with("RESTORE DATABASE [Sales] FROM DISK='"));
    }

    #[tokio::test]
    async fn test_restore_rejects_wrong_database() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let outcome = backup_database(&client, "localhost", "Sales", dir.path(), noon())
            .await
            .unwrap();

        let err = restore_database(&client, &outcome.path, Some("Inventory"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wrong restore file selected"));
        assert_eq!(client.statements().len(), 1);
    }

    #[test]
    fn test_restore_rejects_unknown_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_restore_target(&dir.path().join("other.bak"), None).unwrap_err();
        assert!(matches!(err, DbToolsError::RestoreFile(_)));
    }

    #[test]
    fn test_restore_requires_a_file() {
        let err = resolve_restore_target(Path::new(""), None).unwrap_err();
        assert!(err.to_string().contains("restore file not selected"));
    }
}
