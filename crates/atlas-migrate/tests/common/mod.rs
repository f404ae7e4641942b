#![allow(dead_code)]

use atlas_migrate::{diff::DiffEngine, Error};
use std::{
    cell::Cell,
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

/// A diff engine that only understands `CREATE TABLE` and `DROP TABLE`.
///
/// It names files like Atlas does, with increasing timestamps,
/// and maintains an `atlas.sum` listing the migration files.
#[derive(Debug, Default)]
pub struct TableDiff {
    calls: Cell<usize>,
    /// Fail the call with this index (starting at 0).
    pub fail_on: Option<usize>,
    /// Write nothing on the call with this index.
    pub silent_on: Option<usize>,
}

impl TableDiff {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    pub fn silent_on(call: usize) -> Self {
        Self {
            silent_on: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn next_call(&self) -> Result<usize, Error> {
        let call = self.calls.get();
        self.calls.set(call + 1);

        if self.fail_on == Some(call) {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "injected failure")));
        }

        Ok(call)
    }
}

/// Tables by name with their `CREATE TABLE` statements.
type Tables = BTreeMap<String, String>;

fn sql_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |e| e == "sql"))
        .filter(|p| {
            !p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("schema-")
        })
        .collect::<Vec<_>>();
    files.sort();
    files
}

fn replay(path: &Path) -> Tables {
    let mut tables = Tables::new();

    let files = if path.is_dir() {
        sql_files(path)
    } else if path.exists() {
        vec![path.to_path_buf()]
    } else {
        Vec::new()
    };

    for file in files {
        for stmt in fs::read_to_string(file).unwrap().split(';') {
            let stmt = stmt.trim();
            let words = stmt.split_whitespace().collect::<Vec<_>>();

            match words.as_slice() {
                ["CREATE", "TABLE", name, ..] => {
                    tables.insert(name.to_string(), format!("{stmt};"));
                }
                ["DROP", "TABLE", name, ..] => {
                    tables.remove(*name);
                }
                _ => {}
            }
        }
    }

    tables
}

fn diff(from: &Tables, to: &Tables) -> String {
    let mut stmts = Vec::new();

    for (name, def) in from {
        if to.get(name) != Some(def) {
            stmts.push(format!("DROP TABLE {name};"));
        }
    }

    for (name, def) in to {
        if from.get(name) != Some(def) {
            stmts.push(def.clone());
        }
    }

    stmts.join("\n")
}

impl DiffEngine for TableDiff {
    fn migrate_diff(&self, dir: &Path, name: &str, to: &Path) -> Result<(), Error> {
        let call = self.next_call()?;

        if self.silent_on == Some(call) {
            return Ok(());
        }

        let sql = diff(&replay(dir), &replay(to));
        if sql.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(dir)?;

        let existing = sql_files(dir);
        let timestamp = existing
            .last()
            .and_then(|p| p.file_name().unwrap().to_string_lossy()[..14].parse::<u64>().ok())
            .map_or(20231129085922, |t| t + 1);

        fs::write(dir.join(format!("{timestamp}_{name}.sql")), format!("{sql}\n"))?;

        let sum = sql_files(dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(dir.join("atlas.sum"), sum)?;

        Ok(())
    }
}

/// Every file below `dir` with its content.
pub fn tree(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walk(dir)
        .into_iter()
        .map(|p| {
            let content = fs::read(&p).unwrap();
            (p.strip_prefix(dir).unwrap().to_path_buf(), content)
        })
        .collect()
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if !dir.exists() {
        return files;
    }

    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(walk(&path));
        } else {
            files.push(path);
        }
    }

    files
}

pub const SEA_ORM_LIB: &str = r#"pub use sea_orm_migration::prelude::*;

mod m20220101_000001_create_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20220101_000001_create_table::Migration),
        ]
    }
}
"#;
