//! Execution of external programs.
//!
//! All tools are invoked with an argument vector, never through a shell.

use crate::Error;
use std::{
    path::Path,
    process::{Command, Output},
};

/// Run the command to completion with captured output.
///
/// # Errors
///
/// [`Error::Spawn`] if the program could not be started, and
/// [`Error::ExternalTool`] if it exited unsuccessfully. The standard error
/// of a failed tool is logged before returning.
pub fn run(cmd: &mut Command) -> Result<Output, Error> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    tracing::debug!(
        program = %program,
        args = ?cmd.get_args().collect::<Vec<_>>(),
        "running external tool"
    );

    let output = cmd.output().map_err(|source| Error::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::error!(program = %program, status = %output.status, "{}", stderr.trim_end());
        return Err(Error::ExternalTool {
            program,
            status: output.status,
            stderr,
        });
    }

    Ok(output)
}

/// Same as [`run`], returning the standard output as text.
///
/// # Errors
///
/// See [`run`].
pub fn run_stdout(cmd: &mut Command) -> Result<String, Error> {
    let output = run(cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Format the given Rust source files with `cargo fmt`.
///
/// # Errors
///
/// See [`run`].
pub fn cargo_fmt(cargo: &Path, files: &[&Path]) -> Result<(), Error> {
    let mut cmd = Command::new(cargo);
    cmd.arg("fmt").arg("--");
    cmd.args(files);
    run(&mut cmd)?;
    Ok(())
}
