//! # Atlas Migrate
//!
//! Generates SQL migrations for [SeaORM](https://www.sea-ql.org/SeaORM/) projects
//! from plain SQL schema files, using [Atlas](https://atlasgo.io) to compute
//! the differences.
//!
//! Migrations are kept in a migration set directory:
//!
//! ```text
//! migration/atlas
//! ├── up
//! │   ├── 20231129085922_schema.sql
//! │   └── atlas.sum
//! └── down
//!     ├── 20231129085922_schema.sql
//!     └── schema-20231129085922_schema.sql
//! ```
//!
//! Each up migration is paired with a down migration of the same name and
//! a snapshot of the schema the migration leads to. Every migration pair is
//! then wired into the migration crate as a SeaORM migration module.
//!
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc
)]

pub mod builder;
pub mod diff;
pub mod entity;
pub mod error;
pub mod gen;
pub mod migration_set;
pub mod oracle;
pub mod tasks;
pub mod tool;

pub use error::Error;

#[cfg(feature = "cli")]
pub mod cli;

/// The default migration set directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migration/atlas";

/// The default directory of the desired schema.
pub const DEFAULT_SCHEMA_DIR: &str = "migration/schema";

/// The default source directory of the migration crate.
pub const DEFAULT_SRC_DIR: &str = "migration/src";

/// The default output directory of generated entities.
pub const DEFAULT_ENTITY_DIR: &str = "src/entity";

/// Commonly used types and functions.
pub mod prelude {
    pub use super::builder::MigrationPairBuilder;
    pub use super::diff::{Atlas, DiffEngine};
    pub use super::migration_set::{MigrationPair, MigrationSet};
    pub use super::oracle::{EphemeralPostgres, OracleConfig, OsAssignedPort, PortAllocator};
    pub use super::tasks::Tools;
    pub use super::Error;
}
