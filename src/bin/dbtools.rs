//! The dbtools command-line interface.
//!
//! # Usage
//!
//! ```bash
//! # Which source files call which stored procedures of Sales?
//! dbtools scan ./src --database Sales
//!
//! # Explicit names, C# and VB files
//! dbtools scan ./src usp_GetUser usp_SaveOrder --ext vb,cs
//!
//! # List databases / procedures
//! dbtools databases
//! dbtools procs Sales
//!
//! # Backup and restore
//! dbtools backup Sales --out D:\backups
//! dbtools restore D:\backups\Sales_202403051207.bak --database Sales
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dbtools::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbtools")]
#[command(version)]
#[command(about = "Database admin helpers and stored procedure usage scanner", long_about = None)]
#[command(after_help = "EXAMPLES:
    dbtools scan ./src --database Sales
    dbtools scan ./src usp_GetUser usp_SaveOrder --ext vb,cs --format json
    dbtools --host db01\\PROD databases
    dbtools backup Sales --out ./backups")]
struct Cli {
    /// SQL Server instance passed to sqlcmd -S
    #[arg(long, global = true, env = "DBTOOLS_HOST")]
    host: Option<String>,

    /// Native connection URL (postgres:// or mysql://), used instead of sqlcmd
    #[arg(long, global = true, env = "DBTOOLS_DATABASE_URL")]
    url: Option<String>,

    /// sqlcmd executable
    #[arg(long, global = true)]
    sqlcmd: Option<String>,

    /// Config file (default: <config dir>/dbtools/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Tree,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Find source files referencing stored procedures
    Scan {
        /// Directory to search
        root: PathBuf,

        /// Procedure names to look for
        names: Vec<String>,

        /// Take the procedure names from this database
        #[arg(short, long)]
        database: Option<String>,

        /// File extensions to include
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Only match names not embedded in a longer identifier
        #[arg(long)]
        whole_word: bool,

        /// Worker threads (0 = one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "tree")]
        format: OutputFormat,
    },
    /// List user databases
    Databases,
    /// List stored procedures of a database
    Procs {
        database: String,
    },
    /// Back up a database
    Backup {
        database: String,

        /// Backup directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Restore a database from a backup made by dbtools
    Restore {
        /// Backup file
        file: PathBuf,

        /// Database the file must belong to
        #[arg(short, long)]
        database: Option<String>,
    },
}

/// The client selected by `--url`.
enum Client {
    SqlCmd(SqlCmdClient),
    Sqlx(SqlxClient),
}

impl DatabaseClient for Client {
    fn dialect(&self) -> Dialect {
        match self {
            Client::SqlCmd(c) => c.dialect(),
            Client::Sqlx(c) => c.dialect(),
        }
    }

    async fn execute(&self, database: Option<&str>, statement: &str) -> DbToolsResult<Vec<String>> {
        match self {
            Client::SqlCmd(c) => c.execute(database, statement).await,
            Client::Sqlx(c) => c.execute(database, statement).await,
        }
    }

    async fn list_databases(&self) -> DbToolsResult<Vec<String>> {
        match self {
            Client::SqlCmd(c) => c.list_databases().await,
            Client::Sqlx(c) => c.list_databases().await,
        }
    }

    async fn list_procedures(&self, database: &str) -> DbToolsResult<Vec<ProcedureName>> {
        match self {
            Client::SqlCmd(c) => c.list_procedures(database).await,
            Client::Sqlx(c) => c.list_procedures(database).await,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dbtools::logging::init_logging(cli.verbose) {
        eprintln!("{} {}", "Warning:".yellow().bold(), e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ToolsConfig::load_or_default(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(url) = &cli.url {
        config.server.url = Some(url.clone());
    }
    if let Some(sqlcmd) = &cli.sqlcmd {
        config.server.sqlcmd = sqlcmd.clone();
    }

    match cli.command {
        Commands::Scan {
            root,
            names,
            database,
            ext,
            whole_word,
            threads,
            format,
        } => {
            if !ext.is_empty() {
                config.scan.extensions = ext;
            }
            if whole_word {
                config.scan.whole_word = true;
            }
            if let Some(threads) = threads {
                config.scan.threads = threads;
            }
            scan(&config, root, names, database.as_deref(), format).await
        }
        Commands::Databases => {
            let client = connect(&config).await?;
            for name in client.list_databases().await? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Procs { database } => {
            let client = connect(&config).await?;
            for name in client.list_procedures(&database).await? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Backup { database, out } => {
            let dir = out.unwrap_or_else(|| config.backup.directory.clone());
            let client = connect(&config).await?;
            let outcome = backup_database(
                &client,
                &config.server.host,
                &database,
                &dir,
                chrono::Local::now(),
            )
            .await
            .with_context(|| format!("Backup of {} failed", database))?;
            print_admin_outcome("Backed up", &outcome);
            Ok(())
        }
        Commands::Restore { file, database } => {
            let client = connect(&config).await?;
            let outcome = restore_database(&client, &file, database.as_deref())
                .await
                .with_context(|| format!("Restore from {} failed", file.display()))?;
            print_admin_outcome("Restored", &outcome);
            Ok(())
        }
    }
}

async fn connect(config: &ToolsConfig) -> Result<Client> {
    match &config.server.url {
        Some(url) => {
            tracing::debug!(dialect = ?Dialect::from_url(url), "connecting");
            Ok(Client::Sqlx(SqlxClient::connect(url).await?))
        }
        None => Ok(Client::SqlCmd(
            SqlCmdClient::new(config.server.host.clone())
                .program(config.server.sqlcmd.clone())
                .rules(config.output_rules()?),
        )),
    }
}

async fn scan(
    config: &ToolsConfig,
    root: PathBuf,
    names: Vec<String>,
    database: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let mut procedures: Vec<ProcedureName> = names.into_iter().map(ProcedureName::from).collect();
    if let Some(db) = database {
        let client = connect(config).await?;
        let listed = client
            .list_procedures(db)
            .await
            .with_context(|| format!("Cannot list procedures of {}", db))?;
        tracing::debug!(database = db, count = listed.len(), "procedures listed");
        procedures.extend(listed);
    }

    let options = config.scan_options();
    let cancel = CancelFlag::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        scan_directory(&root, &procedures, &options, &cancel)
    })
    .await
    .context("Scan worker panicked")??;

    for skipped in &outcome.skipped {
        eprintln!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("skipped {}: {}", skipped.path.display(), skipped.message).yellow()
        );
    }

    let count = outcome.report.file_count();
    match format {
        OutputFormat::Tree => {
            if !outcome.report.is_empty() {
                print!("{}", outcome.report.render_tree());
                println!();
            }
            println!("{}", format!("{} files found", count).green().bold());
        }
        OutputFormat::Json => {
            println!("{}", outcome.report.to_json()?);
            eprintln!("{} files found", count);
        }
    }
    Ok(())
}

fn print_admin_outcome(action: &str, outcome: &AdminOutcome) {
    println!(
        "{} {} {} {}",
        "✓".green(),
        action,
        outcome.database.cyan(),
        outcome.path.display().to_string().dimmed()
    );
    if let Some(status) = &outcome.status {
        println!("  {}", status.white());
    }
}
