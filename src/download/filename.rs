//! Destination file naming.
//!
//! Names derive from catalog metadata and may be replaced mid-attempt by a
//! `Content-Disposition` filename from the server. Everything funnels
//! through [`sanitize_file_name`] so a hostile server or catalog entry
//! cannot escape the output directory.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::api::Item;

/// Extension used when neither catalog path nor server header supplies one.
const DEFAULT_EXTENSION: &str = ".mkv";

/// Fallback name when sanitizing leaves nothing.
const FALLBACK_NAME: &str = "download";

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^a-zA-Z0-9._\- ]+").expect("static pattern")
});

/// Replaces unsafe characters with `_` and trims leading/trailing `.`,
/// `_` and spaces. An empty result becomes `download`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == '_' || c == ' ');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds a destination file name for a catalog item.
///
/// Episodes become `<Series> - SxxEyy - <Name><ext>`; everything else is
/// `<Name> (<year>)<ext>` with the year omitted when unknown. The
/// extension comes from the item's server-side path, defaulting to `.mkv`.
#[must_use]
pub fn build_item_filename(item: &Item) -> String {
    let extension = item
        .path
        .as_deref()
        .and_then(file_extension)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let name = if item.name.is_empty() {
        FALLBACK_NAME
    } else {
        &item.name
    };
    let stem = if item.is_episode() {
        let series = item.series_name.as_deref().unwrap_or("Series");
        match (item.parent_index_number, item.index_number) {
            (Some(season), Some(episode)) => {
                format!("{series} - S{season:02}E{episode:02} - {name}")
            }
            _ => format!("{series} - {name}"),
        }
    } else if let Some(year) = item.production_year {
        format!("{name} ({year})")
    } else {
        name.to_string()
    };

    format!("{}{extension}", sanitize_file_name(&stem))
}

/// Extracts a lowercase extension (with dot) from a path-like string.
fn file_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(char::is_alphanumeric))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Pulls a filename out of a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*=` form (percent-decoded) over the plain
/// `filename=` form. The result is sanitized; `None` means the header
/// carries no usable name.
#[must_use]
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("filename*=") {
            // filename*=UTF-8''percent%20encoded.mkv
            let encoded = value.rsplit("''").next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return usable_name(&decoded);
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }
    plain.as_deref().and_then(usable_name)
}

fn usable_name(raw: &str) -> Option<String> {
    // Strip any path components the server might smuggle in.
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let extension = file_extension(base);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if extension.is_some() => stem,
        _ => base,
    };
    let sanitized = sanitize_file_name(stem);
    if sanitized == FALLBACK_NAME && stem.trim().is_empty() {
        return None;
    }
    Some(format!("{sanitized}{}", extension.unwrap_or_default()))
}

/// Joins the output directory with a sanitized file name.
#[must_use]
pub fn destination_path(output_dir: &Path, file_name: &str) -> PathBuf {
    output_dir.join(file_name)
}
