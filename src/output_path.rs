//! Output-path composer. Source filenames and user preferences are both
//! untrusted input here: every segment is sanitized before it touches the
//! filesystem, and the result always carries a non-empty stem + extension.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{Preset, Tier};
use crate::settings::Preferences;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase a preset id into a filename-safe slug.
pub fn slugify(raw: &str) -> String {
    SLUG_RE
        .replace_all(&raw.to_ascii_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Replace filesystem-hostile characters and strip parent-directory
/// references from a single path segment.
fn sanitize_segment(raw: &str) -> String {
    let stripped = raw.replace("..", "");
    stripped
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/' => '_',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Build the output path for a job: preferred output directory (else the
/// source's directory), sanitized stem with optional preset/tier suffixes,
/// and the preset's extension.
pub fn compose_output_path(
    source_path: &str,
    preset: &Preset,
    tier: Tier,
    prefs: &Preferences,
) -> PathBuf {
    let source = Path::new(source_path);

    let base_dir = match prefs.output_directory.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => source
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&preset.id));

    let mut separator = sanitize_segment(&prefs.filename_separator);
    if separator.is_empty() {
        separator = "-".to_string();
    }

    let mut name = stem;
    if name.is_empty() {
        name = "output".to_string();
    }
    if prefs.include_preset_in_name {
        let slug = slugify(&preset.id);
        if !slug.is_empty() {
            name.push_str(&separator);
            name.push_str(&slug);
        }
    }
    if prefs.include_tier_in_name {
        name.push_str(&separator);
        name.push_str(tier.as_str());
    }

    let extension = preset
        .output_extension
        .as_deref()
        .map(sanitize_segment)
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| preset.container.extension().to_string());

    base_dir.join(format!("{name}.{extension}"))
}
