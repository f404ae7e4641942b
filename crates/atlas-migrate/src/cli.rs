#![allow(clippy::too_many_lines)]
use crate::{
    diff::{Atlas, DEFAULT_DEV_URL},
    migration_set::MigrationPair,
    oracle::{FixedPort, OsAssignedPort, PortAllocator},
    tasks::{self, DataMigration, SchemaMigration, Tools},
    DEFAULT_ENTITY_DIR, DEFAULT_MIGRATIONS_DIR, DEFAULT_SCHEMA_DIR, DEFAULT_SRC_DIR,
};
use clap::{CommandFactory, Parser};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use std::{
    io,
    path::{Path, PathBuf},
    process,
    str::FromStr,
};
use tracing_subscriber::{
    fmt::format::FmtSpan, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

/// Create migration files.
#[derive(Debug, clap::Parser)]
#[command(name = "atlas-migrate", version)]
pub struct Migrate {
    /// Log level (debug, info, warn, error).
    ///
    /// The `RUST_LOG` environment variable takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: LogLevel,
    /// Disable colors in messages.
    #[arg(long, global = true)]
    no_colors: bool,
    /// Enable the logging of tracing spans.
    #[arg(long, global = true)]
    verbose: bool,
    /// Path to the `atlas` binary.
    #[arg(long, env = "ATLAS_BIN", default_value = "atlas", global = true)]
    atlas: PathBuf,
    /// Dev database URL used by Atlas to compute differences.
    #[arg(long, env = "ATLAS_DEV_URL", default_value = DEFAULT_DEV_URL, global = true)]
    dev_url: String,
    /// Do not format generated Rust files with `cargo fmt`.
    ///
    /// The generated modules are left unformatted, on a single line.
    #[arg(long, global = true)]
    no_fmt: bool,
    #[command(subcommand)]
    operation: Option<Operation>,
}

#[derive(Debug, clap::Subcommand)]
enum Operation {
    /// Create schema migration files.
    Schema {
        /// The name of the migration.
        #[arg(long, default_value = "schema")]
        name: String,
        /// The desired schema, a SQL file or a directory of SQL files.
        #[arg(long, default_value = DEFAULT_SCHEMA_DIR)]
        to: PathBuf,
        /// The migration set directory.
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
        /// The source directory of the migration crate.
        #[arg(long, default_value = DEFAULT_SRC_DIR)]
        src_dir: PathBuf,
    },
    /// Create data migration files.
    Data {
        /// The name of the migration.
        #[arg(long, default_value = "data")]
        name: String,
        /// The migration set directory.
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
        /// The source directory of the migration crate.
        #[arg(long, default_value = DEFAULT_SRC_DIR)]
        src_dir: PathBuf,
        /// Host port of the temporary database, chosen by the OS if not given.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create entity files.
    Entity {
        /// The migration set directory.
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
        /// The output directory of the entities.
        #[arg(long, default_value = DEFAULT_ENTITY_DIR)]
        ent_dir: PathBuf,
        /// Host port of the temporary database, chosen by the OS if not given.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Verify that every up migration has a down migration.
    #[command(visible_aliases = ["verify", "validate"])]
    Check {
        /// The migration set directory.
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
    },
    /// List all migrations.
    #[command(visible_aliases = ["list", "ls"])]
    Status {
        /// The migration set directory.
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
    },
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            level => Err(anyhow::anyhow!("invalid log level `{}`", level)),
        }
    }
}

/// Run the CLI application.
///
/// # Panics
///
/// This functon assumes that it has control over the entire application.
///
/// It will happily alter global state (tracing), panic, or terminate the process.
pub fn run() {
    dotenv::dotenv().ok();

    let migrate = Migrate::parse();
    setup_logging(&migrate);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(execute(migrate));
}

async fn execute(migrate: Migrate) {
    let tools = tools(&migrate);

    let Some(operation) = &migrate.operation else {
        print_usage();
        return;
    };

    match operation {
        Operation::Schema {
            name,
            to,
            dir,
            src_dir,
        } => {
            let opts = SchemaMigration {
                name: name.clone(),
                to: to.clone(),
                dir: dir.clone(),
                src_dir: src_dir.clone(),
            };

            match tasks::create_schema_migration(&tools.atlas, &tools, &opts) {
                Ok(Some(module)) => tracing::info!(module = %module, "created schema migration"),
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(error = %error, "error creating schema migration");
                    process::exit(1);
                }
            }
        }
        Operation::Data {
            name,
            dir,
            src_dir,
            port,
        } => {
            let opts = DataMigration {
                name: name.clone(),
                dir: dir.clone(),
                src_dir: src_dir.clone(),
            };

            match tasks::create_data_migration(&tools, &*ports(*port), &opts).await {
                Ok(module) => tracing::info!(module = %module, "created data migration"),
                Err(error) => {
                    tracing::error!(error = %error, "error creating data migration");
                    process::exit(1);
                }
            }
        }
        Operation::Entity { dir, ent_dir, port } => {
            if let Err(error) =
                tasks::create_entity_files(&tools, &*ports(*port), dir, ent_dir).await
            {
                tracing::error!(error = %error, "error creating entity files");
                process::exit(1);
            }
        }
        Operation::Check { dir } => check(dir),
        Operation::Status { dir } => log_status(dir),
        Operation::Unknown(args) => {
            if let Some(command) = args.first() {
                tracing::warn!(command = %command, "unknown subcommand");
            }
            print_usage();
        }
    }
}

fn print_usage() {
    if let Err(error) = Migrate::command().print_help() {
        tracing::debug!(error = %error, "failed to print help");
    }
}

fn check(dir: &Path) {
    match tasks::check(dir) {
        Ok(orphans) if orphans.is_empty() => {
            tracing::info!("No issues found");
        }
        Ok(orphans) => {
            for orphan in orphans {
                tracing::error!(
                    migration = %orphan.name,
                    up = orphan.up,
                    down = orphan.down,
                    "unpaired migration"
                );
            }
            process::exit(1);
        }
        Err(err) => {
            tracing::error!(error = %err, "error verifying migrations");
            process::exit(1);
        }
    }
}

fn log_status(dir: &Path) {
    fn mark(present: bool) -> Cell {
        Cell::new(if present { "x" } else { "" }).set_alignment(CellAlignment::Center)
    }

    let pairs = match tasks::status(dir) {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(error = %error, "error retrieving migration status");
            process::exit(1);
        }
    };

    let all_valid = pairs.iter().all(|p: &MigrationPair| p.up && p.down);

    let mut table = Table::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(Vec::from([
            Cell::new("Migration").set_alignment(CellAlignment::Center),
            Cell::new("Up").set_alignment(CellAlignment::Center),
            Cell::new("Down").set_alignment(CellAlignment::Center),
            Cell::new("Schema").set_alignment(CellAlignment::Center),
        ]));

    for pair in pairs {
        table.add_row(Vec::from([
            Cell::new(&pair.name).set_alignment(CellAlignment::Center),
            mark(pair.up),
            mark(pair.down),
            mark(pair.snapshot),
        ]));
    }

    println!("{}", table);

    if !all_valid {
        process::exit(1);
    }
}

fn tools(migrate: &Migrate) -> Tools {
    Tools {
        atlas: Atlas::default()
            .with_binary(&migrate.atlas)
            .with_dev_url(migrate.dev_url.clone()),
        format: !migrate.no_fmt,
        ..Tools::default()
    }
}

fn ports(port: Option<u16>) -> Box<dyn PortAllocator> {
    match port {
        Some(p) => Box::new(FixedPort(p)),
        None => Box::new(OsAssignedPort),
    }
}

fn setup_logging(migrate: &Migrate) {
    let format = tracing_subscriber::fmt::format().with_ansi(colors(migrate));

    let verbose = migrate.verbose;

    let span_events = if verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::CLOSE
    };

    let registry = tracing_subscriber::registry();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::default().add_directive(migrate.log_level.level().into()),
    };

    if verbose {
        registry
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_span_events(span_events)
                    .event_format(format.pretty()),
            )
            .init();
    } else {
        registry
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_span_events(span_events)
                    .event_format(format),
            )
            .init();
    }
}

fn colors(matches: &Migrate) -> bool {
    if matches.no_colors {
        return false;
    }

    atty::is(atty::Stream::Stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let migrate = Migrate::try_parse_from(["atlas-migrate", "schema"]).unwrap();

        match migrate.operation {
            Some(Operation::Schema {
                name,
                to,
                dir,
                src_dir,
            }) => {
                assert_eq!(name, "schema");
                assert_eq!(to, PathBuf::from("migration/schema"));
                assert_eq!(dir, PathBuf::from("migration/atlas"));
                assert_eq!(src_dir, PathBuf::from("migration/src"));
            }
            op => panic!("unexpected operation: {op:?}"),
        }
    }

    #[test]
    fn flags_after_subcommands() {
        let migrate = Migrate::try_parse_from([
            "atlas-migrate",
            "data",
            "--name",
            "seed",
            "--port",
            "15432",
            "--log-level",
            "debug",
            "--no-fmt",
        ])
        .unwrap();

        assert!(matches!(migrate.log_level, LogLevel::Debug));
        assert!(!tools(&migrate).format);
        assert!(matches!(
            migrate.operation,
            Some(Operation::Data { ref name, port: Some(15432), .. }) if name == "seed"
        ));
    }

    #[test]
    fn missing_subcommand_is_allowed() {
        let migrate = Migrate::try_parse_from(["atlas-migrate"]).unwrap();
        assert!(migrate.operation.is_none());
    }

    #[test]
    fn unknown_subcommands_are_allowed() {
        let migrate = Migrate::try_parse_from(["atlas-migrate", "frobnicate", "--now"]).unwrap();

        match migrate.operation {
            Some(Operation::Unknown(args)) => assert_eq!(args, ["frobnicate", "--now"]),
            op => panic!("unexpected operation: {op:?}"),
        }
    }

    #[test]
    fn no_fmt_help_mentions_unformatted_output() {
        let help = Migrate::command().render_long_help().to_string();
        assert!(help.contains("--no-fmt"));
        assert!(help.contains("left unformatted"));
    }

    #[test]
    fn invalid_log_level() {
        assert!(Migrate::try_parse_from(["atlas-migrate", "--log-level", "loud"]).is_err());
    }
}
