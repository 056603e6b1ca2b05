use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Read-only preferences consumed by the engine. The hosting application
/// owns persistence; the core never writes these back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Parallel job limit; values below 1 are clamped up.
    pub max_concurrency: u32,
    /// Target directory for outputs. Empty/None keeps outputs next to the
    /// source file.
    pub output_directory: Option<String>,
    pub include_preset_in_name: bool,
    pub include_tier_in_name: bool,
    pub filename_separator: String,
    /// Explicit encoder tool path. Overridden by `FFPRESS_FFMPEG_PATH`.
    pub ffmpeg_path: Option<String>,
    /// Explicit probe tool path. Overridden by `FFPRESS_FFPROBE_PATH`.
    pub ffprobe_path: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            output_directory: None,
            include_preset_in_name: false,
            include_tier_in_name: false,
            filename_separator: "-".to_string(),
            ffmpeg_path: None,
            ffprobe_path: None,
        }
    }
}

impl Preferences {
    pub fn effective_max_concurrency(&self) -> usize {
        (self.max_concurrency as usize).max(1)
    }
}

fn resolve_tool(env_key: &str, preferred: Option<&str>, fallback: &str) -> PathBuf {
    if let Ok(path) = std::env::var(env_key)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    if let Some(path) = preferred
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(fallback)
}

/// Resolve the encoder tool: env override, then preferences, then PATH.
pub fn resolve_ffmpeg_path(prefs: &Preferences) -> PathBuf {
    resolve_tool("FFPRESS_FFMPEG_PATH", prefs.ffmpeg_path.as_deref(), "ffmpeg")
}

/// Resolve the probe tool: env override, then preferences, then PATH.
pub fn resolve_ffprobe_path(prefs: &Preferences) -> PathBuf {
    resolve_tool(
        "FFPRESS_FFPROBE_PATH",
        prefs.ffprobe_path.as_deref(),
        "ffprobe",
    )
}
