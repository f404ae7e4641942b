//! The workflows offered by the CLI.

use crate::{
    builder::MigrationPairBuilder,
    diff::{Atlas, DiffEngine},
    entity::generate_entities,
    gen,
    migration_set::{MigrationPair, MigrationSet},
    oracle::{OracleConfig, PortAllocator},
    tool, Error,
};
use filetime::FileTime;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// The dev database used when applying schemas for entity generation.
pub const DEFAULT_APPLY_DEV_URL: &str = "docker://postgres/15";

/// External tools and how to invoke them.
#[derive(Debug, Clone)]
pub struct Tools {
    pub atlas: Atlas,
    /// Dev database URL for `atlas schema apply`.
    pub apply_dev_url: String,
    pub sea_orm_cli: PathBuf,
    pub cargo: PathBuf,
    /// Whether generated Rust files are formatted with `cargo fmt`.
    pub format: bool,
    pub oracle: OracleConfig,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            atlas: Atlas::default(),
            apply_dev_url: DEFAULT_APPLY_DEV_URL.to_string(),
            sea_orm_cli: PathBuf::from("sea-orm-cli"),
            cargo: PathBuf::from("cargo"),
            format: true,
            oracle: OracleConfig::default(),
        }
    }
}

impl Tools {
    fn format(&self, files: &[&Path]) -> Result<(), Error> {
        if !self.format {
            return Ok(());
        }

        tool::cargo_fmt(&self.cargo, files)
    }
}

/// Options of [`create_schema_migration`].
#[derive(Debug, Clone)]
pub struct SchemaMigration {
    /// Name of the migration.
    pub name: String,
    /// The desired schema, a SQL file or a directory of SQL files.
    pub to: PathBuf,
    /// The migration set directory.
    pub dir: PathBuf,
    /// The source directory of the migration crate.
    pub src_dir: PathBuf,
}

/// Options of [`create_data_migration`].
#[derive(Debug, Clone)]
pub struct DataMigration {
    pub name: String,
    pub dir: PathBuf,
    pub src_dir: PathBuf,
}

/// Create a migration pair for the desired schema together with
/// its SeaORM migration module.
///
/// Returns the new module name, or `None` if the schema did not change.
///
/// # Errors
///
/// Any error of the steps is returned. If registering the module fails
/// the migration files stay in place and have to be registered manually.
pub fn create_schema_migration<E: DiffEngine>(
    engine: E,
    tools: &Tools,
    opts: &SchemaMigration,
) -> Result<Option<String>, Error> {
    gen::validate_name(&opts.name)?;

    let set = MigrationSet::new(&opts.dir);

    let Some(basename) = MigrationPairBuilder::new(&set, engine).build(&opts.name, &opts.to)?
    else {
        return Ok(None);
    };

    let module_name = gen::module_name(&basename)?;

    let up = gen::relative_path(&opts.src_dir, &set.up_dir().join(&basename))?;
    let down = gen::relative_path(&opts.src_dir, &set.down_dir().join(&basename))?;

    let module = gen::write_module(&opts.src_dir, &module_name, &gen::sql_migration(&up, &down))?;

    let lib = opts.src_dir.join("lib.rs");
    gen::register_migration(&lib, &module_name)?;

    tools.format(&[&lib, &module])?;
    touch(&opts.src_dir);

    Ok(Some(module_name))
}

/// Create an empty migration with entities generated from the latest schema.
///
/// Returns the new module name.
///
/// # Errors
///
/// [`Error::MissingSnapshot`] is returned if no schema migration exists yet,
/// other errors of the steps are propagated.
pub async fn create_data_migration(
    tools: &Tools,
    ports: &dyn PortAllocator,
    opts: &DataMigration,
) -> Result<String, Error> {
    let module_name = gen::timestamped_module_name(&opts.name, OffsetDateTime::now_utc())?;
    let entity_module = format!("{module_name}_entity");

    let set = MigrationSet::new(&opts.dir);
    let schema = set.latest_snapshot()?.ok_or_else(|| Error::MissingSnapshot {
        dir: set.down_dir(),
    })?;

    generate_entities(tools, ports, &schema, &opts.src_dir.join(&entity_module)).await?;

    let module = gen::write_module(
        &opts.src_dir,
        &module_name,
        &gen::data_migration(&entity_module),
    )?;

    let lib = opts.src_dir.join("lib.rs");
    gen::register_migration(&lib, &module_name)?;
    gen::register_module(&lib, &entity_module)?;

    tools.format(&[&lib, &module])?;
    touch(&opts.src_dir);

    Ok(module_name)
}

/// Generate entities for the schema reached by all up migrations in `dir`.
///
/// # Errors
///
/// Errors of the database and the external tools are returned.
pub async fn create_entity_files(
    tools: &Tools,
    ports: &dyn PortAllocator,
    dir: &Path,
    ent_dir: &Path,
) -> Result<(), Error> {
    let set = MigrationSet::new(dir);
    generate_entities(tools, ports, &set.up_dir(), ent_dir).await
}

/// Migrations that violate the up/down pairing.
///
/// # Errors
///
/// I/O errors are returned.
pub fn check(dir: &Path) -> Result<Vec<MigrationPair>, Error> {
    MigrationSet::new(dir).orphans()
}

/// All migrations of the set.
///
/// # Errors
///
/// I/O errors are returned.
pub fn status(dir: &Path) -> Result<Vec<MigrationPair>, Error> {
    MigrationSet::new(dir).pairs()
}

// Builds watching the source directory pick up the new module.
fn touch(dir: &Path) {
    if let Err(err) = filetime::set_file_mtime(dir, FileTime::now()) {
        tracing::debug!(error = %err, "error updating the source directory");
    }
}
