//! The `status` subcommand: what is on disk in each data directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use civicfeeds_lib::config::DataDirs;
use civicfeeds_lib::ProjectLayout;

use crate::output;

/// Contents of one logical data directory.
pub struct DirStatus {
    pub name: &'static str,
    pub path: PathBuf,
    /// `None` when the directory does not exist.
    pub files: Option<Vec<(String, u64)>>,
}

/// CSV files in every data directory, sorted by name.
pub fn scan(layout: &ProjectLayout) -> Result<Vec<DirStatus>> {
    let mut out = Vec::new();
    for name in DataDirs::NAMES {
        let path = layout.data_dir(name);
        let files = if path.is_dir() {
            Some(csv_files(&path)?)
        } else {
            None
        };
        out.push(DirStatus { name, path, files });
    }
    Ok(out)
}

fn csv_files(dir: &Path) -> Result<Vec<(String, u64)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let size = entry.metadata()?.len();
        files.push((entry.file_name().to_string_lossy().into_owned(), size));
    }
    files.sort();
    Ok(files)
}

pub fn run(config_path: &Path) -> Result<()> {
    let (config, root) = super::load(config_path)?;
    let layout = ProjectLayout::new(root, config.data_dirs.clone());
    output::print_status(&scan(&layout)?);
    Ok(())
}
