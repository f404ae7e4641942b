//! The on-disk layout of paired migrations.

use crate::Error;
use itertools::{EitherOrBoth, Itertools};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Prefix of the schema snapshots stored next to down migrations.
pub const SNAPSHOT_PREFIX: &str = "schema-";

/// A directory with `up` and `down` migrations and the schema snapshot history.
///
/// Every `up/<file>.sql` is expected to have a `down/<file>.sql` counterpart
/// and a `down/schema-<file>.sql` snapshot of the schema it migrates to.
#[derive(Debug, Clone)]
pub struct MigrationSet {
    root: PathBuf,
}

impl MigrationSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn up_dir(&self) -> PathBuf {
        self.root.join("up")
    }

    #[must_use]
    pub fn down_dir(&self) -> PathBuf {
        self.root.join("down")
    }

    /// The most recent up migration file, if any.
    ///
    /// # Errors
    ///
    /// Errors are returned if the directory cannot be read.
    pub fn latest_up(&self) -> Result<Option<PathBuf>, Error> {
        latest_migration_file(&self.up_dir())
    }

    /// The most recent schema snapshot, if any.
    ///
    /// # Errors
    ///
    /// Errors are returned if the directory cannot be read.
    pub fn latest_snapshot(&self) -> Result<Option<PathBuf>, Error> {
        let down_dir = self.down_dir();

        if !down_dir.is_dir() {
            return Ok(None);
        }

        let mut latest: Option<PathBuf> = None;

        for entry in fs::read_dir(&down_dir).map_err(Error::path(&down_dir))? {
            let entry = entry?;

            if !entry
                .file_name()
                .to_string_lossy()
                .starts_with(SNAPSHOT_PREFIX)
            {
                continue;
            }

            let path = entry.path();
            if latest.as_ref().map_or(true, |l| path > *l) {
                latest = Some(path);
            }
        }

        Ok(latest)
    }

    /// The schema before the next migration.
    ///
    /// This is the latest recorded snapshot, or an empty schema file
    /// created inside `scratch` when there is no history yet.
    /// The migration set itself is never written.
    ///
    /// # Errors
    ///
    /// Errors are returned on I/O failures.
    pub fn resolve_previous_snapshot(&self, scratch: &Path) -> Result<PathBuf, Error> {
        if let Some(snapshot) = self.latest_snapshot()? {
            return Ok(snapshot);
        }

        let empty = scratch.join(format!("{}.sql", uuid::Uuid::new_v4().simple()));
        fs::write(&empty, "").map_err(Error::path(&empty))?;

        tracing::debug!(path = ?empty, "no schema history, using an empty schema");

        Ok(empty)
    }

    /// All migrations paired by file name.
    ///
    /// # Errors
    ///
    /// Errors are returned if the directories cannot be read.
    pub fn pairs(&self) -> Result<Vec<MigrationPair>, Error> {
        let up = migration_files(&self.up_dir())?;
        let down = migration_files(&self.down_dir())?;
        let down_dir = self.down_dir();

        let pairs = up
            .into_iter()
            .merge_join_by(down, |u, d| u.cmp(d))
            .map(|pair| {
                let (name, up, down) = match pair {
                    EitherOrBoth::Both(name, _) => (name, true, true),
                    EitherOrBoth::Left(name) => (name, true, false),
                    EitherOrBoth::Right(name) => (name, false, true),
                };

                let snapshot = down_dir.join(format!("{SNAPSHOT_PREFIX}{name}")).exists();

                MigrationPair {
                    name,
                    up,
                    down,
                    snapshot,
                }
            })
            .collect();

        Ok(pairs)
    }

    /// Check that every up migration has a down counterpart and vice versa.
    ///
    /// Returns the unpaired migrations.
    ///
    /// # Errors
    ///
    /// Errors are returned if the directories cannot be read.
    pub fn orphans(&self) -> Result<Vec<MigrationPair>, Error> {
        Ok(self
            .pairs()?
            .into_iter()
            .filter(|p| !(p.up && p.down))
            .collect())
    }
}

/// A migration file name and which parts of it exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPair {
    /// File name of the migration, e.g. `20231129090123_schema.sql`.
    pub name: String,
    pub up: bool,
    pub down: bool,
    /// Whether the `schema-` snapshot exists.
    pub snapshot: bool,
}

/// The lexicographically greatest `*.sql` file in `dir`.
///
/// Migration file names are timestamp-prefixed, so this is the newest one.
///
/// # Errors
///
/// Errors are returned if the directory cannot be read.
pub fn latest_migration_file(dir: &Path) -> Result<Option<PathBuf>, Error> {
    Ok(migration_files(dir)?
        .pop()
        .map(|name| dir.join(name)))
}

/// Sorted `*.sql` migration file names in `dir`, snapshots excluded.
///
/// A missing directory has no migrations.
pub(crate) fn migration_files(dir: &Path) -> Result<Vec<String>, Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();

    for entry in fs::read_dir(dir).map_err(Error::path(dir))? {
        let entry = entry?;

        if entry.file_type()?.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with(SNAPSHOT_PREFIX) || !name.to_ascii_lowercase().ends_with(".sql") {
            continue;
        }

        files.push(name);
    }

    files.sort();

    Ok(files)
}
