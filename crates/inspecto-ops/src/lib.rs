//! Operational helpers: logging setup and portrait dump directories.

use std::path::{Path, PathBuf};

use inspecto_types::{config::OpsConfig, InspectoError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_dump_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = path.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create dump dir {}: {err}", dir.display())))?;
    info!("Portrait dump directory ready at {:?}", dir);
    Ok(dir)
}

pub fn ops_error(message: impl Into<String>) -> InspectoError {
    InspectoError::Ops(message.into())
}
