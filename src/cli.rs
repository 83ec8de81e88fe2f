//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use cdownloader_core::DEFAULT_CHUNK_SIZE;

/// Download one or more URLs concurrently with live progress.
///
/// Servers that answer with a basic-authentication challenge get the
/// `--username`/`--password` pair, or an interactive prompt when none was
/// given.
#[derive(Parser, Debug)]
#[command(name = "cdl")]
#[command(author, version)]
pub struct Args {
    /// URLs to download
    pub urls: Vec<String>,

    /// Username sent when a server asks for basic authentication
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Password sent when a server asks for basic authentication
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// Hold each download in memory and write it to disk once complete
    /// (faster, but an interrupted download is lost)
    #[arg(long)]
    pub buffer: bool,

    /// Directory downloads are saved into
    #[arg(short = 'O', long, default_value = ".")]
    pub output_directory: PathBuf,

    /// User-Agent preset (chrome, chromium, firefox, safari, default) or a literal value
    #[arg(long, default_value = "default")]
    pub user_agent: String,

    /// Warn when less than this many GiB of memory is available (buffered mode)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub ram_warning_at: u64,

    /// File with one URL per line, appended to the positional URLs
    #[arg(long = "from-list", visible_alias = "from-file", value_name = "FILE")]
    pub from_list: Option<PathBuf>,

    /// Do not follow redirects
    #[arg(long)]
    pub ignore_redirects: bool,

    /// Comma-separated file names aligned with the URLs; `-` derives that one
    #[arg(long)]
    pub file_names: Option<String>,

    /// Seconds to wait for each read before giving up
    #[arg(short = 'R', long, default_value_t = 60.0, value_parser = parse_seconds)]
    pub read_timeout: f64,

    /// Seconds to wait for a connection before giving up
    #[arg(short = 'C', long, default_value_t = 10.0, value_parser = parse_seconds)]
    pub connect_timeout: f64,

    /// Bytes per progress step while streaming a body
    #[arg(short = 'S', long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    pub chunk_size: usize,

    /// JSON object of cookie name/value pairs sent with every request
    /// (defaults to ./cookies.json when present)
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Skip the HEAD request before the authentication probe
    #[arg(long)]
    pub no_head_probe: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    if seconds.is_finite() && seconds > 0.0 {
        Ok(seconds)
    } else {
        Err(format!("`{value}` must be a positive number of seconds"))
    }
}

fn parse_chunk_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1 byte".to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("`{value}` is not a byte count")),
    }
}
