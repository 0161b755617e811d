//! # dbtools
//!
//! Database administration helpers for SQL Server (through `sqlcmd`) and
//! PostgreSQL/MySQL (through sqlx): list databases and stored procedures,
//! back up and restore, and find which source files reference which stored
//! procedures.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use dbtools::prelude::*;
//!
//! let client = SqlCmdClient::new(".\\SQLEXPRESS");
//! let procs = client.list_procedures("Sales").await?;
//!
//! let outcome = scan_directory(
//!     Path::new("/src/app"),
//!     &procs,
//!     &ScanOptions::default(),
//!     &CancelFlag::new(),
//! )?;
//! print!("{}", outcome.report.render_tree());
//! ```

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod parser;
pub mod report;
pub mod scanner;
pub mod transpiler;
pub mod walker;

pub mod prelude {
    pub use crate::backup::{AdminOutcome, BackupManifest, backup_database, restore_database};
    pub use crate::config::ToolsConfig;
    pub use crate::engine::{DatabaseClient, SqlCmdClient, SqlxClient};
    pub use crate::error::*;
    pub use crate::parser::{ExtractPolicy, NameValidator, OutputRules};
    pub use crate::report::{FileError, MatchResult, ProcedureName, ScanOutcome, ScanReport};
    pub use crate::scanner::{CancelFlag, MatchMode, ScanOptions, UsageScanner, scan_directory};
    pub use crate::transpiler::{Dialect, Statement, ToSql};
    pub use crate::walker::FileFilter;
}

pub use scanner::scan_directory;
