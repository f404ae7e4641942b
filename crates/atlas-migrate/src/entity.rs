//! SeaORM entity generation from a schema.

use crate::{
    oracle::{EphemeralPostgres, PortAllocator},
    tasks::Tools,
    tool, Error,
};
use std::{path::Path, process::Command};

/// Generate SeaORM entities for the schema at `schema` into `out_dir`.
///
/// The schema is applied to a disposable database that
/// `sea-orm-cli` then inspects. The database is stopped in all cases.
///
/// # Errors
///
/// Errors from starting the database or from the external tools are returned.
pub async fn generate_entities(
    tools: &Tools,
    ports: &dyn PortAllocator,
    schema: &Path,
    out_dir: &Path,
) -> Result<(), Error> {
    let db = EphemeralPostgres::start(&tools.oracle, ports).await?;

    let res = apply_and_generate(tools, &db.url(), schema, out_dir).await;
    let stopped = db.stop().await;

    res?;
    stopped
}

async fn apply_and_generate(
    tools: &Tools,
    url: &str,
    schema: &Path,
    out_dir: &Path,
) -> Result<(), Error> {
    tracing::info!(schema = ?schema, "applying schema");

    let atlas = tools.atlas.clone();
    let apply_url = format!("{url}?sslmode=disable");
    let dev_url = tools.apply_dev_url.clone();
    let schema = schema.to_path_buf();

    // Blocking tools run off the runtime thread, so that
    // the database logs keep being drained meanwhile.
    tokio::task::spawn_blocking(move || atlas.schema_apply(&apply_url, &schema, &dev_url))
        .await
        .map_err(std::io::Error::from)??;

    tracing::info!(path = ?out_dir, "creating entities");

    let mut cmd = sea_orm_generate(&tools.sea_orm_cli, url, out_dir);
    tokio::task::spawn_blocking(move || tool::run(&mut cmd).map(drop))
        .await
        .map_err(std::io::Error::from)??;

    Ok(())
}

fn sea_orm_generate(sea_orm_cli: &Path, url: &str, out_dir: &Path) -> Command {
    let mut cmd = Command::new(sea_orm_cli);
    cmd.args(["generate", "entity", "-u", url, "-o"]).arg(out_dir);
    cmd
}
