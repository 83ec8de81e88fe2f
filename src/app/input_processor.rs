//! Assembly of the download requests from positional URLs, a URL list file,
//! `--file-names` and the cookie file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cdownloader_core::{Credentials, DownloadRequest};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::app::validation;
use crate::cli::Args;

/// Cookie file picked up from the working directory when `--cookies` is absent.
const DEFAULT_COOKIE_FILE: &str = "cookies.json";

/// Builds one request per supplied URL, in the order given.
///
/// File names are aligned with the URLs by position before any
/// deduplication happens, so a duplicate URL later dropped by the engine
/// takes its name with it.
pub(crate) fn process_input(args: &Args) -> Result<Vec<DownloadRequest>> {
    let mut urls = args.urls.clone();
    if let Some(list) = &args.from_list {
        let listed = read_url_list(list)?;
        info!(count = listed.len(), path = %list.display(), "loaded URLs from list");
        urls.extend(listed);
    }
    validation::ensure_urls_present(&urls)?;
    validation::ensure_output_directory_usable(&args.output_directory)?;

    let file_names = parse_file_names(args.file_names.as_deref());
    if let Some(surplus) = validation::surplus_file_names(file_names.len(), urls.len()) {
        warn!(surplus, "more file names than URLs; extra names are ignored");
    }

    // clap rejects a username without a password and the reverse.
    let credentials =
        Credentials::from_parts(args.username.clone(), args.password.clone()).map(Arc::new);

    Ok(build_requests(
        urls,
        file_names,
        &args.output_directory,
        credentials.as_ref(),
    ))
}

/// Reads a newline-delimited URL list, skipping blank lines.
pub(crate) fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Splits `--file-names`; a `-` entry leaves that URL's name to be derived.
pub(crate) fn parse_file_names(raw: Option<&str>) -> Vec<Option<PathBuf>> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split(',')
        .map(|name| match name.trim() {
            "-" | "" => None,
            name => Some(PathBuf::from(name)),
        })
        .collect()
}

pub(crate) fn build_requests(
    urls: Vec<String>,
    file_names: Vec<Option<PathBuf>>,
    directory: &Path,
    credentials: Option<&Arc<Credentials>>,
) -> Vec<DownloadRequest> {
    let mut names = file_names.into_iter();
    urls.into_iter()
        .map(|url| {
            let mut request = DownloadRequest::new(url, directory);
            if let Some(Some(name)) = names.next() {
                request = request.with_file_path(name);
            }
            if let Some(credentials) = credentials {
                request = request.with_credentials(Arc::clone(credentials));
            }
            request
        })
        .collect()
}

/// Loads the `Cookie` header sent with every request.
///
/// An explicit file must exist; otherwise `./cookies.json` is used when present.
pub(crate) fn load_cookie_header(explicit: Option<&Path>) -> Result<Option<String>> {
    load_cookie_header_from(explicit, Path::new(DEFAULT_COOKIE_FILE))
}

fn load_cookie_header_from(explicit: Option<&Path>, fallback: &Path) -> Result<Option<String>> {
    let path = match explicit {
        Some(path) => path,
        None if fallback.is_file() => fallback,
        None => return Ok(None),
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cookie file {}", path.display()))?;
    let header = cookie_header_from_json(&content)
        .with_context(|| format!("invalid cookie file {}", path.display()))?;
    debug!(path = %path.display(), present = header.is_some(), "cookie file loaded");
    Ok(header)
}

/// Renders a JSON object of cookie names to values as `a=1; b=2`.
pub(crate) fn cookie_header_from_json(content: &str) -> Result<Option<String>> {
    let cookies: Map<String, Value> =
        serde_json::from_str(content).context("expected a JSON object of name/value pairs")?;
    let mut pairs = Vec::with_capacity(cookies.len());
    for (name, value) in cookies {
        let value = match value {
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                bail!("cookie {name:?} must be a string, number or boolean")
            }
        };
        pairs.push(format!("{name}={value}"));
    }
    Ok((!pairs.is_empty()).then(|| pairs.join("; ")))
}
