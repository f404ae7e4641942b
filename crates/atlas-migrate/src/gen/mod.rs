//! SeaORM migration module generation.

use crate::Error;
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use regex::Regex;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};

pub mod registrar;

pub use registrar::{register_migration, register_module, LibFile};

// The length of dates before the migration names.
const MIG_DATE_PREFIX_LEN: usize = "20001010235912_".len();

/// Check that the name can be used in file and module names.
///
/// # Errors
///
/// [`Error::InvalidMigrationName`] is returned for names that are not identifiers.
pub fn validate_name(name: &str) -> Result<(), Error> {
    let re = Regex::new("^[A-Za-z_][A-Za-z_0-9]*$").expect("valid regex");

    if re.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidMigrationName {
            name: name.to_string(),
        })
    }
}

/// The SeaORM module name of a migration file.
///
/// `20231129090123_set_manager_id.sql` becomes `m20231129_090123_set_manager_id`,
/// the naming used by `sea-orm-cli migrate generate`.
///
/// # Errors
///
/// An error is returned if the file name does not start with a timestamp.
pub fn module_name(basename: &str) -> Result<String, Error> {
    let invalid = || Error::InvalidFileName {
        path: PathBuf::from(basename),
    };

    let stem = Path::new(basename)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;

    if stem.len() < MIG_DATE_PREFIX_LEN
        || !stem.is_ascii()
        || !stem[..MIG_DATE_PREFIX_LEN - 1]
            .bytes()
            .all(|b| b.is_ascii_digit())
        || stem.as_bytes()[MIG_DATE_PREFIX_LEN - 1] != b'_'
    {
        return Err(invalid());
    }

    Ok(format!("m{}_{}", &stem[..8], &stem[8..]))
}

/// A module name for a migration created now.
///
/// # Errors
///
/// The name must be valid, see [`validate_name`].
pub fn timestamped_module_name(name: &str, now: OffsetDateTime) -> Result<String, Error> {
    validate_name(name)?;

    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let now_formatted = now
        .format(format)
        .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;

    Ok(format!("m{now_formatted}_{name}"))
}

/// A migration module that executes the given SQL files.
///
/// The paths are embedded as-is with `include_str!`, so they must be
/// relative to the generated module.
#[must_use]
pub fn sql_migration(up_sql: &str, down_sql: &str) -> TokenStream {
    migration_module(quote! {}, exec_sql(up_sql), exec_sql(down_sql))
}

/// An empty migration module that has access to the entities
/// in the sibling module `entity_module`.
#[must_use]
pub fn data_migration(entity_module: &str) -> TokenStream {
    let entity = Ident::new(entity_module, Span::call_site());

    migration_module(
        quote! {
            use super::#entity as entity;
        },
        quote! {},
        quote! {},
    )
}

fn exec_sql(path: &str) -> TokenStream {
    quote! {
        manager
            .get_connection()
            .execute_unprepared(include_str!(#path))
            .await?;
    }
}

fn migration_module(prelude: TokenStream, up: TokenStream, down: TokenStream) -> TokenStream {
    quote! {
        #prelude
        use sea_orm_migration::prelude::*;

        #[derive(DeriveMigrationName)]
        pub struct Migration;

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                #up
                Ok(())
            }

            async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                #down
                Ok(())
            }
        }
    }
}

/// Write the module `<src_dir>/<module_name>.rs`.
///
/// The tokens are written as rendered, formatting is left to
/// [`cargo_fmt`](crate::tool::cargo_fmt).
///
/// # Errors
///
/// I/O errors are returned.
pub fn write_module(src_dir: &Path, module_name: &str, module: &TokenStream) -> Result<PathBuf, Error> {
    let path = src_dir.join(format!("{module_name}.rs"));

    tracing::info!(path = ?path, "creating migration module");

    fs::write(&path, module.to_string()).map_err(Error::path(&path))?;

    Ok(path)
}

/// The path of `target` relative to the directory `base`, with `/` separators.
///
/// # Errors
///
/// I/O errors are returned if the working directory is needed and unavailable.
pub fn relative_path(base: &Path, target: &Path) -> Result<String, Error> {
    let base = normalize(base)?;
    let target = normalize(target)?;

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let parts = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .chain(target[common..].iter().cloned())
        .collect::<Vec<_>>();

    Ok(parts.join("/"))
}

fn normalize(path: &Path) -> Result<Vec<String>, Error> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    Ok(parts)
}
