//! Schema diffing against a disposable dev database.

use crate::{tool, Error};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    process::Command,
};

/// The default dev database used by Atlas to normalize schemas.
pub const DEFAULT_DEV_URL: &str = "docker://postgres/15/dev?search_path=public";

/// The default Atlas output format for generated SQL.
pub const DEFAULT_FORMAT: &str = r#"{{ sql . "  " }}"#;

/// An engine that writes the SQL needed to move a migration directory
/// to a schema state.
///
/// Schemas are SQL files or directories of SQL files.
pub trait DiffEngine {
    /// Append a new migration file named after `name` to the migration
    /// directory `dir` that brings the schema replayed from `dir` to `to`.
    ///
    /// No file is written if the schemas are equivalent.
    ///
    /// # Errors
    ///
    /// Any engine failure is returned.
    fn migrate_diff(&self, dir: &Path, name: &str, to: &Path) -> Result<(), Error>;
}

impl<T: DiffEngine + ?Sized> DiffEngine for &T {
    fn migrate_diff(&self, dir: &Path, name: &str, to: &Path) -> Result<(), Error> {
        (**self).migrate_diff(dir, name, to)
    }
}

/// The [Atlas](https://atlasgo.io) CLI.
#[derive(Debug, Clone)]
pub struct Atlas {
    binary: PathBuf,
    dev_url: Cow<'static, str>,
    format: Cow<'static, str>,
}

impl Default for Atlas {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("atlas"),
            dev_url: Cow::Borrowed(DEFAULT_DEV_URL),
            format: Cow::Borrowed(DEFAULT_FORMAT),
        }
    }
}

impl Atlas {
    /// Use the `atlas` binary at the given path.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the dev database URL, see [`DEFAULT_DEV_URL`].
    #[must_use]
    pub fn with_dev_url(mut self, url: impl Into<Cow<'static, str>>) -> Self {
        self.dev_url = url.into();
        self
    }

    /// Set the SQL output format, see [`DEFAULT_FORMAT`].
    #[must_use]
    pub fn with_format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = format.into();
        self
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Return the SQL transforming the schema `from` into `to`.
    ///
    /// An empty string is returned if the schemas are equivalent.
    /// Migration pairs are built with [`DiffEngine::migrate_diff`] instead,
    /// this is for inspecting changes without touching a migration directory.
    ///
    /// # Errors
    ///
    /// Any Atlas failure is returned.
    pub fn schema_diff(&self, from: &Path, to: &Path) -> Result<String, Error> {
        let out = tool::run_stdout(
            self.command()
                .args(["schema", "diff", "--from"])
                .arg(file_url(from))
                .arg("--to")
                .arg(file_url(to))
                .args(["--dev-url", &*self.dev_url, "--format", &*self.format]),
        )?;

        Ok(out.trim().to_string())
    }

    /// Apply the schema at `to` to the database at `url`.
    ///
    /// # Errors
    ///
    /// Any Atlas failure is returned.
    pub fn schema_apply(&self, url: &str, to: &Path, dev_url: &str) -> Result<(), Error> {
        tool::run(
            self.command()
                .args(["schema", "apply", "--url", url, "--to"])
                .arg(file_url(to))
                .args(["--dev-url", dev_url, "--auto-approve"]),
        )?;
        Ok(())
    }
}

impl DiffEngine for Atlas {
    fn migrate_diff(&self, dir: &Path, name: &str, to: &Path) -> Result<(), Error> {
        tool::run(
            self.command()
                .args(["migrate", "diff", name, "--to"])
                .arg(file_url(to))
                .args(["--dev-url", &*self.dev_url, "--format", &*self.format])
                .arg("--dir")
                .arg(file_url(dir)),
        )?;
        Ok(())
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_urls() {
        assert_eq!(
            file_url(Path::new("migration/schema")),
            "file://migration/schema"
        );
        assert_eq!(file_url(Path::new("/tmp/x.sql")), "file:///tmp/x.sql");
    }

    #[test]
    fn atlas_failure_is_reported() {
        let atlas = Atlas::default().with_binary("false");
        let err = atlas
            .schema_diff(Path::new("a.sql"), Path::new("b.sql"))
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool { .. }));
    }

    #[test]
    fn schema_diff_output_is_trimmed() {
        // `echo` stands in for atlas and prints its arguments.
        let atlas = Atlas::default()
            .with_binary("echo")
            .with_dev_url("docker://dev")
            .with_format("fmt");
        let out = atlas
            .schema_diff(Path::new("a.sql"), Path::new("b.sql"))
            .unwrap();
        assert_eq!(
            out,
            "schema diff --from file://a.sql --to file://b.sql --dev-url docker://dev --format fmt"
        );
    }
}
