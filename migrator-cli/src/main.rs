//! Command line front end for the `migrator` engine.
//!
//! ```text
//! migrator --scripts db/migrations --database app.db up
//! migrator --driver postgres --database postgres://localhost/app down 20121212000000
//! migrator --database app.db preview --down 0
//! ```

mod format;

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use migrator::{
    FileSystemMigrationFinder, Migration, MigrationService, RunnerFactory,
    DEFAULT_HISTORY_TABLE_NAME,
};
use tracing_subscriber::EnvFilter;

use crate::format::{format_completed, format_started};

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Apply and revert versioned SQL migration scripts", version)]
struct Cli {
    /// Directory containing `<version>_<name>_up.sql` / `_down.sql` scripts
    #[arg(long, global = true, env = "MIGRATOR_SCRIPTS", default_value = ".")]
    scripts: PathBuf,

    /// Database file path (sqlite) or connection URL (postgres)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = Driver::Sqlite)]
    driver: Driver,

    /// Name of the table recording executed versions
    #[arg(long, global = true, default_value = DEFAULT_HISTORY_TABLE_NAME)]
    history_table: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pending up migration
    Up,
    /// Revert executed migrations newer than VERSION (0 reverts everything)
    Down {
        #[arg(allow_negative_numbers = true)]
        version: i64,
    },
    /// List what `up` (or `down --down VERSION`) would run, without running it
    Preview {
        #[arg(long, allow_negative_numbers = true)]
        down: Option<i64>,
    },
    /// List executed versions
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Driver {
    Sqlite,
    Postgres,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing::debug!(
        driver = ?cli.driver,
        scripts = %cli.scripts.display(),
        history_table = %cli.history_table,
        "Parsed command line"
    );
    let database = cli
        .database
        .clone()
        .ok_or("No database given. Pass --database or set DATABASE_URL.")?;

    match cli.driver {
        #[cfg(feature = "sqlite")]
        Driver::Sqlite => {
            let factory = migrator::sqlite::SqliteRunnerFactory::new(database)
                .with_history_table_name(&cli.history_table);
            execute(&cli, factory)
        }
        #[cfg(feature = "postgres")]
        Driver::Postgres => {
            let factory = migrator::postgres::PostgresRunnerFactory::new(database)
                .with_history_table_name(&cli.history_table);
            execute(&cli, factory)
        }
        #[allow(unreachable_patterns)]
        driver => Err(format!("Driver {:?} is not compiled into this binary", driver).into()),
    }
}

fn execute<R: RunnerFactory>(cli: &Cli, factory: R) -> Result<(), Box<dyn std::error::Error>> {
    factory.check_connection()?;

    let stopwatch: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let started = Arc::clone(&stopwatch);
    let service = MigrationService::new(FileSystemMigrationFinder::from_dir(&cli.scripts), factory)
        .on_migration_start(move |version, name| {
            if let Ok(mut slot) = started.lock() {
                *slot = Some(Instant::now());
            }
            print!("{}", format_started(version, name));
            let _ = std::io::stdout().flush();
        })
        .on_migration_complete(move || {
            let elapsed = stopwatch
                .lock()
                .ok()
                .and_then(|slot| slot.as_ref().map(Instant::elapsed))
                .unwrap_or_default();
            println!("{}", format_completed(elapsed));
        });

    match &cli.command {
        Commands::Up => {
            let report = service.up()?;
            if report.migrations_run.is_empty() {
                println!("Database is up to date.");
            }
        }
        Commands::Down { version } => {
            let report = service.down(*version)?;
            if report.migrations_run.is_empty() {
                println!("Nothing to revert.");
            }
        }
        Commands::Preview { down: None } => print_plan(&service.preview_up()?),
        Commands::Preview {
            down: Some(version),
        } => print_plan(&service.preview_down(*version)?),
        Commands::History => {
            let versions = service.executed_versions()?;
            if versions.is_empty() {
                println!("No migrations have been executed.");
            }
            for version in versions {
                println!("{}", version);
            }
        }
    }
    Ok(())
}

fn print_plan(migrations: &[Migration]) {
    if migrations.is_empty() {
        println!("No migrations would run.");
        return;
    }
    println!("Would run {} migration(s):", migrations.len());
    for migration in migrations {
        println!(
            "  [{}] {} ({})",
            migration.version(),
            migration.name(),
            migration.direction()
        );
    }
}
