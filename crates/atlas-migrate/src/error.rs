use std::{path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

/// An aggregated error type for migration generation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(std::io::Error),
    #[error("i/o error at {path:?}: {source}")]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("`{program}` failed ({status})")]
    ExternalTool {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("database did not become ready within {}", humantime::Duration::from(*timeout))]
    StartupTimeout { timeout: Duration },
    #[error("unsupported file {path:?}: {reason}")]
    UnsupportedFileShape { path: PathBuf, reason: String },
    #[error("there is no schema snapshot in {dir:?}")]
    MissingSnapshot { dir: PathBuf },
    #[error("the reverse diff produced no migration file in {dir:?}")]
    MissingDownMigration { dir: PathBuf },
    #[error("invalid migration name `{name}`")]
    InvalidMigrationName { name: String },
    #[error("invalid migration file name {path:?}")]
    InvalidFileName { path: PathBuf },
}

impl Error {
    pub(crate) fn path(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Path { path, source }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}
