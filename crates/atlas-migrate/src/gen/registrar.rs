//! Registration of generated modules in the migration crate's `lib.rs`.
//!
//! Only a small part of the file is understood: the list of
//! `mod mXXXXXXXX_XXXXXX_name;` declarations and the single `vec![...]`
//! literal returned by `MigratorTrait::migrations`. Everything else is
//! kept untouched.

use crate::Error;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};

const ITEM_INDENT: &str = "            ";

/// A parsed `lib.rs` of a SeaORM migration crate.
#[derive(Debug, Clone)]
pub struct LibFile {
    path: PathBuf,
    lines: Vec<String>,
    trailing_newline: bool,
}

impl LibFile {
    /// Parse the given source, `path` is only used in errors.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            path: path.into(),
            lines: source.lines().map(ToString::to_string).collect(),
            trailing_newline: source.ends_with('\n'),
        }
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// I/O errors are returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(Error::path(path))?;
        Ok(Self::parse(path, &source))
    }

    /// Write the file back to where it was read from.
    ///
    /// # Errors
    ///
    /// I/O errors are returned.
    pub fn save(&self) -> Result<(), Error> {
        fs::write(&self.path, self.to_string()).map_err(Error::path(&self.path))
    }

    /// Names of the declared migration modules, in order.
    pub fn modules(&self) -> Vec<&str> {
        let re = module_regex();

        self.lines
            .iter()
            .filter_map(|line| re.captures(line))
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// Declare `mod <name>;` after the last migration module.
    ///
    /// Returns whether the file changed.
    pub fn add_module(&mut self, name: &str) -> bool {
        if self.modules().contains(&name) {
            return false;
        }

        let re = module_regex();

        let insert_at = self
            .lines
            .iter()
            .rposition(|line| re.is_match(line))
            .or_else(|| {
                self.lines.iter().rposition(|line| {
                    let line = line.trim_start();
                    line.starts_with("use ") || line.starts_with("pub use ")
                })
            })
            .map_or(0, |idx| idx + 1);

        self.lines.insert(insert_at, format!("mod {name};"));

        true
    }

    /// Add `Box::new(<name>::Migration)` to the migrations literal.
    ///
    /// Returns whether the file changed.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFileShape`] is returned unless there is exactly one
    /// `vec![` literal with a closing bracket.
    pub fn add_migration(&mut self, name: &str) -> Result<bool, Error> {
        let expr = format!("Box::new({name}::Migration)");

        if self.lines.iter().any(|line| line.contains(&expr)) {
            return Ok(false);
        }

        let re = Regex::new(r"^\s+vec!\[").expect("valid regex");

        let literals = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        let start = match literals.as_slice() {
            [idx] => *idx,
            _ => {
                return Err(self.unsupported(format!(
                    "expected exactly one `vec![` literal, found {}",
                    literals.len()
                )))
            }
        };

        let open = self.lines[start].find("vec![").map_or(0, |i| i + "vec![".len());

        if let Some(close) = self.lines[start][open..].find(']') {
            let line = &mut self.lines[start];
            let close = open + close;
            let items = line[open..close].trim_end();
            let at = open + items.len();

            let insert = if items.trim().is_empty() {
                expr
            } else if items.ends_with(',') {
                format!(" {expr}")
            } else {
                format!(", {expr}")
            };

            line.insert_str(at, &insert);
            return Ok(true);
        }

        let end = self
            .lines
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, line)| line.contains(']'))
            .map(|(idx, _)| idx)
            .ok_or_else(|| self.unsupported("unterminated `vec![` literal".into()))?;

        if self.lines[end].trim_start().starts_with(']') {
            // The last item may lack a trailing comma.
            if let Some(prev) = (start + 1..end)
                .rev()
                .find(|idx| !self.lines[*idx].trim().is_empty())
            {
                let prev_line = &mut self.lines[prev];
                if !prev_line.trim_end().ends_with(',') {
                    let len = prev_line.trim_end().len();
                    prev_line.truncate(len);
                    prev_line.push(',');
                }
            }

            self.lines.insert(end, format!("{ITEM_INDENT}{expr},"));
        } else {
            let line = &mut self.lines[end];
            let close = line.find(']').unwrap_or(line.len());
            let items = line[..close].trim_end();
            let at = items.len();

            let insert = if items.ends_with(',') {
                format!(" {expr}")
            } else {
                format!(", {expr}")
            };

            line.insert_str(at, &insert);
        }

        Ok(true)
    }

    fn unsupported(&self, reason: String) -> Error {
        Error::UnsupportedFileShape {
            path: self.path.clone(),
            reason,
        }
    }
}

impl std::fmt::Display for LibFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lines.join("\n"))?;
        if self.trailing_newline {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

fn module_regex() -> Regex {
    Regex::new(r"^mod\s+(m[a-zA-Z0-9_]+);").expect("valid regex")
}

/// Declare the migration module `module_name` and add it to the migrations.
///
/// Returns whether the file changed, nothing is written if
/// the migration was already registered.
///
/// # Errors
///
/// I/O errors and [`Error::UnsupportedFileShape`] are returned,
/// the file is left unchanged on errors.
pub fn register_migration(lib_path: &Path, module_name: &str) -> Result<bool, Error> {
    tracing::info!(path = ?lib_path, module = module_name, "registering migration");

    let mut lib = LibFile::open(lib_path)?;

    let declared = lib.add_module(module_name);
    let added = lib.add_migration(module_name)?;

    if declared || added {
        lib.save()?;
    }

    Ok(declared || added)
}

/// Declare the module `module_name` without adding a migration.
///
/// # Errors
///
/// I/O errors are returned.
pub fn register_module(lib_path: &Path, module_name: &str) -> Result<bool, Error> {
    tracing::info!(path = ?lib_path, module = module_name, "adding module");

    let mut lib = LibFile::open(lib_path)?;

    if lib.add_module(module_name) {
        lib.save()?;
        Ok(true)
    } else {
        Ok(false)
    }
}
