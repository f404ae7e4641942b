//! Construction of up/down migration pairs.

use crate::{
    diff::DiffEngine,
    migration_set::{migration_files, MigrationSet, SNAPSHOT_PREFIX},
    Error,
};
use std::{
    collections::HashSet,
    fs, io,
    path::Path,
    time::Instant,
};
use tempfile::TempDir;
use walkdir::WalkDir;

/// The integrity file Atlas keeps in migration directories.
pub const ATLAS_SUM: &str = "atlas.sum";

/// Builds paired up and down migrations for a [`MigrationSet`].
///
/// The up migration is written into the set directly. The down migration
/// is generated in an isolated copy of the up directory and only then
/// moved next to it, together with a snapshot of the target schema.
/// If anything fails after the up migration was written, every file
/// of the new pair is removed again.
///
/// Concurrent builds for the same set are not supported.
#[derive(Debug)]
pub struct MigrationPairBuilder<'a, E: DiffEngine> {
    set: &'a MigrationSet,
    engine: E,
}

impl<'a, E: DiffEngine> MigrationPairBuilder<'a, E> {
    pub fn new(set: &'a MigrationSet, engine: E) -> Self {
        Self { set, engine }
    }

    /// Create a migration pair that migrates to the schema at `to`.
    ///
    /// Returns the file name of the new migration, or `None` if the
    /// schema did not change.
    ///
    /// # Errors
    ///
    /// Diff engine and I/O errors are returned. The migration set
    /// contains no partial migration pair afterwards.
    pub fn build(&self, name: &str, to: &Path) -> Result<Option<String>, Error> {
        let start = Instant::now();
        let scratch = TempDir::new()?;

        let previous_schema = self.set.resolve_previous_snapshot(scratch.path())?;
        let up_dir = self.set.up_dir();
        let previous_up = self.set.latest_up()?;
        let previous_sum = read_optional(&up_dir.join(ATLAS_SUM))?;

        tracing::info!(name, "creating up migration file");
        self.engine.migrate_diff(&up_dir, name, to)?;

        let up_file = match self.set.latest_up()? {
            Some(f) if Some(&f) != previous_up.as_ref() => f,
            _ => {
                tracing::info!("no migration created");
                return Ok(None);
            }
        };

        let basename = file_name(&up_file)?;

        if let Err(error) = self.commit_down(scratch.path(), name, &basename, &previous_schema, to)
        {
            tracing::warn!(migration = %basename, "removing partially created migration");
            self.rollback(&basename, previous_sum.as_deref());
            return Err(error);
        }

        tracing::info!(
            migration = %basename,
            elapsed = %humantime::Duration::from(start.elapsed()),
            "new migration file"
        );

        Ok(Some(basename))
    }

    fn commit_down(
        &self,
        scratch: &Path,
        name: &str,
        basename: &str,
        previous_schema: &Path,
        to: &Path,
    ) -> Result<(), Error> {
        // The down migration is the diff from everything including the new
        // up migration back to the previous schema. It is generated
        // in a copy so that the real up directory is left alone.
        let isolated_up = scratch.join("up");
        copy_tree(&self.set.up_dir(), &isolated_up)?;

        let existing = migration_files(&isolated_up)?
            .into_iter()
            .collect::<HashSet<_>>();

        tracing::info!("creating down migration file");
        self.engine
            .migrate_diff(&isolated_up, &format!("{name}_down"), previous_schema)?;

        let down_file = migration_files(&isolated_up)?
            .into_iter()
            .filter(|f| !existing.contains(f))
            .last()
            .map(|f| isolated_up.join(f))
            .ok_or_else(|| Error::MissingDownMigration {
                dir: isolated_up.clone(),
            })?;

        let down_dir = self.set.down_dir();
        fs::create_dir_all(&down_dir).map_err(Error::path(&down_dir))?;

        let down_target = down_dir.join(basename);
        fs::copy(&down_file, &down_target).map_err(Error::path(&down_target))?;

        let snapshot = down_dir.join(format!("{SNAPSHOT_PREFIX}{basename}"));
        copy_tree(to, &snapshot)?;

        Ok(())
    }

    fn rollback(&self, basename: &str, previous_sum: Option<&[u8]>) {
        let paths = [
            self.set.up_dir().join(basename),
            self.set.down_dir().join(basename),
            self.set
                .down_dir()
                .join(format!("{SNAPSHOT_PREFIX}{basename}")),
        ];

        for path in paths {
            let res = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else if path.exists() {
                fs::remove_file(&path)
            } else {
                continue;
            };

            if let Err(error) = res {
                tracing::error!(error = %error, path = ?path, "failed to remove file");
            }
        }

        // The checksum file must describe the directory without the removed migration.
        let sum = self.set.up_dir().join(ATLAS_SUM);
        let res = match previous_sum {
            Some(content) => fs::write(&sum, content),
            None if sum.exists() => fs::remove_file(&sum),
            None => Ok(()),
        };

        if let Err(error) = res {
            tracing::error!(error = %error, path = ?sum, "failed to restore migration checksums");
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, Error> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(Error::Path {
            path: path.to_path_buf(),
            source: error,
        }),
    }
}

fn file_name(path: &Path) -> Result<String, Error> {
    path.file_name()
        .and_then(|f| f.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| Error::InvalidFileName {
            path: path.to_path_buf(),
        })
}

/// Copy a file or a directory tree from `from` to `to`.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<(), Error> {
    if from.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(Error::path(parent))?;
        }
        fs::copy(from, to).map_err(Error::path(to))?;
        return Ok(());
    }

    for entry in WalkDir::new(from) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(Error::path(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(Error::path(&target))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copies_single_files() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("schema.sql");
        fs::write(&from, "CREATE TABLE t (id INT);").unwrap();

        let to = tmp.path().join("nested/dir/copy.sql");
        copy_tree(&from, &to).unwrap();

        assert_eq!(
            fs::read_to_string(to).unwrap(),
            "CREATE TABLE t (id INT);"
        );
    }

    #[test]
    fn copies_trees() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("schema");
        fs::create_dir_all(from.join("tables")).unwrap();
        fs::write(from.join("a.sql"), "a").unwrap();
        fs::write(from.join("tables/b.sql"), "b").unwrap();

        let to = tmp.path().join("copy");
        copy_tree(&from, &to).unwrap();

        assert_eq!(fs::read_to_string(to.join("a.sql")).unwrap(), "a");
        assert_eq!(fs::read_to_string(to.join("tables/b.sql")).unwrap(), "b");
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = copy_tree(&tmp.path().join("missing"), &tmp.path().join("copy"));
        assert!(err.is_err());
    }
}
