//! Capability registry: asks the encoder tool what it was built with and
//! memoizes the answer for the process lifetime. The snapshot is advisory
//! input to planning only. A missing encoder produces a warning, never a
//! hard error, because user-supplied toolchain builds frequently report
//! incomplete introspection output.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;

use crate::domain::CapabilitySnapshot;
use crate::settings::{Preferences, resolve_ffmpeg_path};

static SNAPSHOT: OnceCell<Arc<CapabilitySnapshot>> = OnceCell::new();

/// Load the capability snapshot, probing the toolchain on first use.
///
/// Never fails destructively: any probing error yields an empty snapshot
/// so that planning can still proceed (with warnings).
pub fn load_capabilities(prefs: &Preferences) -> Arc<CapabilitySnapshot> {
    SNAPSHOT
        .get_or_init(|| Arc::new(detect_capabilities(&resolve_ffmpeg_path(prefs))))
        .clone()
}

pub(crate) fn detect_capabilities(ffmpeg_path: &Path) -> CapabilitySnapshot {
    match probe_toolchain(ffmpeg_path) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(
                tool = %ffmpeg_path.display(),
                error = %format!("{err:#}"),
                "capability probing failed; continuing with an empty snapshot"
            );
            CapabilitySnapshot::default()
        }
    }
}

fn probe_toolchain(ffmpeg_path: &Path) -> Result<CapabilitySnapshot> {
    let encoders_output = run_tool(ffmpeg_path, &["-hide_banner", "-encoders"])?;
    let formats_output = run_tool(ffmpeg_path, &["-hide_banner", "-formats"])?;
    let filters_output = run_tool(ffmpeg_path, &["-hide_banner", "-filters"])?;

    let (video_encoders, audio_encoders) = parse_encoders(&encoders_output);
    Ok(CapabilitySnapshot {
        video_encoders,
        audio_encoders,
        muxers: parse_formats(&formats_output),
        filters: parse_filters(&filters_output),
    })
}

fn run_tool(ffmpeg_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(ffmpeg_path)
        .args(args)
        .output()
        .with_context(|| format!("failed to run {} {}", ffmpeg_path.display(), args.join(" ")))?;
    if !output.status.success() {
        anyhow::bail!(
            "{} {} exited with {}: {}",
            ffmpeg_path.display(),
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `-encoders` output. The flag column's first character classifies
/// the encoder: `V` video, `A` audio; everything else is ignored.
fn parse_encoders(output: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut video = BTreeSet::new();
    let mut audio = BTreeSet::new();

    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.len() < 8 {
            continue;
        }
        let (flags, rest) = trimmed.split_at(7);
        let name = rest.split_whitespace().next().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        match flags.chars().next() {
            Some('V') => {
                video.insert(name.to_string());
            }
            Some('A') => {
                audio.insert(name.to_string());
            }
            _ => {}
        }
    }

    (video, audio)
}

/// Parse `-formats` output, keeping names that can mux (`E` flag).
fn parse_formats(output: &str) -> BTreeSet<String> {
    let mut muxers = BTreeSet::new();

    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.len() < 3 {
            continue;
        }
        let (flags, rest) = trimmed.split_at(3);
        if !flags.contains('E') {
            continue;
        }
        let name = rest.split_whitespace().next().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        // A single line can advertise several comma-joined names
        // (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
        for part in name.split(',') {
            if !part.is_empty() {
                muxers.insert(part.to_string());
            }
        }
    }

    muxers
}

/// Parse `-filters` output. Names flagged with a leading `*` are reported
/// but unavailable in the running build.
fn parse_filters(output: &str) -> BTreeSet<String> {
    let mut filters = BTreeSet::new();

    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.len() < 2 {
            continue;
        }
        let name = trimmed.split_whitespace().next().unwrap_or_default();
        if !name.is_empty() && !name.starts_with('*') {
            filters.insert(name.to_string());
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoders_by_flag_column() {
        let sample = "
 V..... libx264        libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10
 V..... hevc_videotoolbox VideoToolbox H.265
 A..... aac            AAC (Advanced Audio Coding)
 A..... libopus        libopus Opus
 S..... ass            ASS (Advanced SSA) subtitle
";
        let (video, audio) = parse_encoders(sample);
        assert!(video.contains("libx264"));
        assert!(video.contains("hevc_videotoolbox"));
        assert!(!video.contains("ass"));
        assert!(audio.contains("aac"));
        assert!(audio.contains("libopus"));
        assert_eq!(video.len(), 2);
        assert_eq!(audio.len(), 2);
    }

    #[test]
    fn parses_encoders_ignores_short_lines() {
        let sample = "
 V..... h264
 A
 short
";
        let (video, audio) = parse_encoders(sample);
        assert!(video.contains("h264"));
        assert!(audio.is_empty());
    }

    #[test]
    fn parses_formats_requires_mux_flag_and_splits_aliases() {
        let sample = "
 D  matroska             Matroska
 E  mp4                  MP4 (MPEG-4 Part 14)
 DE mov,mp4,m4a,3gp,3g2,mj2 QuickTime / MOV
 DE webm                 WebM
";
        let muxers = parse_formats(sample);
        assert!(muxers.contains("mp4"));
        assert!(muxers.contains("mov"));
        assert!(muxers.contains("m4a"));
        assert!(muxers.contains("webm"));
        // Demux-only entries never become muxers.
        assert!(!muxers.contains("matroska"));
    }

    #[test]
    fn parses_filters_excluding_unavailable_entries() {
        let sample = "
scale               V->V       Scale the input video size.
*scale_cuda         V->V       GPU accelerated scaling (unavailable)
palettegen          V->V       Find the optimal palette for a video.
paletteuse          VV->V      Use a palette to downsample a video.
";
        let filters = parse_filters(sample);
        assert!(filters.contains("scale"));
        assert!(filters.contains("palettegen"));
        assert!(filters.contains("paletteuse"));
        assert!(!filters.contains("*scale_cuda"));
        assert!(!filters.contains("scale_cuda"));
    }

    #[test]
    fn detect_capabilities_survives_a_missing_tool() {
        let snapshot = detect_capabilities(Path::new("/definitely/not/a/real/ffmpeg"));
        assert!(snapshot.is_empty());
    }
}
