use std::path::Path;

use anyhow::{Result, bail};
use clap::CommandFactory;
use clap::error::ErrorKind;

use crate::cli::Args;

/// Rejects a run with nothing to download as a usage error (exit status 2).
pub(crate) fn ensure_urls_present(urls: &[String]) -> Result<()> {
    if urls.iter().any(|url| !url.trim().is_empty()) {
        return Ok(());
    }
    let usage = Args::command().error(ErrorKind::MissingRequiredArgument, "No urls were provided");
    Err(usage.into())
}

pub(crate) fn ensure_output_directory_usable(directory: &Path) -> Result<()> {
    if directory.exists() && !directory.is_dir() {
        bail!(
            "Output directory {} exists but is not a directory.\n  \
             Pass a directory with -O/--output-directory",
            directory.display()
        );
    }
    Ok(())
}

pub(crate) fn surplus_file_names(file_names: usize, urls: usize) -> Option<usize> {
    (file_names > urls).then(|| file_names - urls)
}
