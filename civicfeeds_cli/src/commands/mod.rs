pub mod status;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use civicfeeds_lib::AppConfig;

/// Loads the config file and resolves the project root against the working directory.
pub fn load(config_path: &Path) -> Result<(AppConfig, PathBuf)> {
    let config = AppConfig::load(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let cwd = std::env::current_dir().context("reading current directory")?;
    let root = config.project_root(&cwd);
    Ok((config, root))
}
