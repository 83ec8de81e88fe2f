//! Destination path resolution for downloads.
//!
//! Names come from the caller or from the final (post-redirect) URL, are
//! sanitized, get a suffix from `Content-Type` when they lack one, and are
//! then claimed run-wide so two tasks never share a destination.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use url::Url;

/// Name used when the URL path ends in `/`.
const FALLBACK_NAME: &str = "download";

/// Replaces every character outside `[A-Za-z0-9_.-]` with `-`.
///
/// Dot-only names (`.`, `..`) are rewritten as well so the result can never
/// climb out of the output directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        return sanitized.replace('.', "-");
    }
    sanitized
}

/// Guesses a file extension (with leading dot) from a `Content-Type` value.
///
/// Known types map to their usual extension. Otherwise a subtype made only
/// of ASCII alphanumerics is used as-is (`image/webp` -> `.webp`).
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let known = match mime.as_str() {
        "text/html" => Some(".html"),
        "text/plain" => Some(".txt"),
        "application/json" => Some(".json"),
        "application/xml" | "text/xml" => Some(".xml"),
        "application/pdf" => Some(".pdf"),
        "application/octet-stream" => Some(".bin"),
        "image/jpeg" => Some(".jpg"),
        "image/svg+xml" => Some(".svg"),
        "application/gzip" | "application/x-gzip" => Some(".gz"),
        "application/x-tar" => Some(".tar"),
        "text/javascript" | "application/javascript" => Some(".js"),
        "audio/mpeg" => Some(".mp3"),
        _ => None,
    };
    if let Some(ext) = known {
        return Some(ext.to_string());
    }

    let (_, subtype) = mime.split_once('/')?;
    (!subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| format!(".{subtype}"))
}

/// Derives a file name from the last segment of `url`'s path.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    if segment.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    let decoded = urlencoding::decode(segment)
        .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
    sanitize_filename(&decoded)
}

/// Resolves where a response should be written.
///
/// `explicit` wins when given (joined to `directory` unless absolute);
/// otherwise the name is derived from `final_url`. Either way a name without
/// an extension gets one from `content_type` when it can be guessed.
#[must_use]
pub fn resolve_destination(
    explicit: Option<&Path>,
    directory: &Path,
    final_url: &Url,
    content_type: Option<&str>,
) -> PathBuf {
    let mut path = match explicit {
        Some(name) if name.is_absolute() => name.to_path_buf(),
        Some(name) => directory.join(name),
        None => directory.join(filename_from_url(final_url)),
    };

    if path.extension().is_none()
        && let Some(content_type) = content_type
    {
        match extension_from_content_type(content_type) {
            Some(ext) => {
                let mut name = path.file_name().unwrap_or_default().to_os_string();
                name.push(&ext);
                path.set_file_name(name);
            }
            None => warn!(
                content_type,
                path = %path.display(),
                "failed to detect file suffix"
            ),
        }
    }
    path
}

/// Run-wide registry of destinations handed out to tasks.
///
/// Two URLs can resolve to the same path (`a.example/x.bin` and
/// `b.example/x.bin`). The first claim keeps the name; later ones get
/// `stem_2.ext`, `stem_3.ext`, and so on.
#[derive(Debug, Default)]
pub struct PathClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl PathClaims {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path` or the first free numbered variant of it.
    pub fn claim(&self, path: PathBuf) -> PathBuf {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if claimed.insert(path.clone()) {
            return path;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut index = 2usize;
        loop {
            let candidate = path.with_file_name(format!("{stem}_{index}{ext}"));
            if claimed.insert(candidate.clone()) {
                debug!(
                    requested = %path.display(),
                    assigned = %candidate.display(),
                    "destination already claimed in this run"
                );
                return candidate;
            }
            index += 1;
        }
    }

    /// Number of destinations claimed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
