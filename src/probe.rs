//! Probe adapter: runs the probe tool against a source file and normalizes
//! its JSON output into a `ProbeSummary`.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::domain::{ColorMetadata, ProbeSummary};
use crate::error::ProbeError;

const SHOW_ENTRIES: &str = "format=duration:stream=index,codec_name,codec_type,width,height,\
channels,avg_frame_rate,color_primaries,color_transfer,color_space";

const TEXT_SUB_CODECS: &[&str] = &["subrip", "srt", "ass", "ssa", "mov_text", "webvtt", "text"];
const IMAGE_SUB_CODECS: &[&str] = &[
    "hdmv_pgs_subtitle",
    "pgssub",
    "dvd_subtitle",
    "dvdsub",
    "dvb_subtitle",
    "xsub",
];

#[derive(Debug, Deserialize)]
struct RawProbe {
    format: Option<RawFormat>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    codec_name: Option<String>,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    avg_frame_rate: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    color_space: Option<String>,
}

/// Normalize a user-supplied source path: trims whitespace and converts
/// `file://` URLs into plain filesystem paths with percent-decoding.
pub fn normalize_source_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("file://") {
        // Strip an optional host segment ("file://localhost/x" -> "/x").
        let path = match rest.find('/') {
            Some(0) | None => rest,
            Some(idx) => &rest[idx..],
        };
        return percent_decode(path);
    }
    trimmed.to_string()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
        {
            out.push(hi << 4 | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Probe a source file. All streams are inspected so that audio and
/// subtitle facts populate alongside the primary video stream.
pub fn probe(ffprobe_path: &Path, source_path: &str) -> Result<ProbeSummary, ProbeError> {
    let normalized = normalize_source_path(source_path);
    let output = Command::new(ffprobe_path)
        .args(["-v", "error", "-show_entries", SHOW_ENTRIES, "-of", "json"])
        .arg(&normalized)
        .output()
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => ProbeError::Missing(ffprobe_path.display().to_string()),
            _ => ProbeError::Process(format!(
                "failed to run {}: {err}",
                ffprobe_path.display()
            )),
        })?;

    if !output.status.success() {
        return Err(ProbeError::Process(format!(
            "probe of {normalized} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw: RawProbe = serde_json::from_slice(&output.stdout)
        .map_err(|err| ProbeError::Invalid(format!("unparseable probe JSON: {err}")))?;
    Ok(summarize(raw))
}

fn summarize(raw: RawProbe) -> ProbeSummary {
    let mut summary = ProbeSummary {
        duration_sec: raw
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0),
        ..ProbeSummary::default()
    };

    for stream in raw.streams {
        match stream.codec_type.as_deref() {
            Some("video") if summary.vcodec.is_none() => {
                summary.vcodec = stream.codec_name.clone();
                summary.width = stream.width;
                summary.height = stream.height;
                summary.fps = stream.avg_frame_rate.as_deref().and_then(parse_frame_rate);
                let color = ColorMetadata {
                    primaries: stream.color_primaries,
                    trc: stream.color_transfer,
                    space: stream.color_space,
                };
                if !color.is_empty() {
                    summary.color = Some(color);
                }
            }
            Some("audio") if summary.acodec.is_none() => {
                summary.acodec = stream.codec_name.clone();
                summary.channels = stream.channels;
            }
            Some("subtitle") => {
                let name = stream.codec_name.as_deref().unwrap_or_default();
                if IMAGE_SUB_CODECS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                    summary.has_image_subs = true;
                } else if TEXT_SUB_CODECS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                    summary.has_text_subs = true;
                }
            }
            _ => {}
        }
    }

    summary
}

/// Parse an ffprobe rational frame rate such as "30000/1001" or "25/1".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        let fps = num / den;
        return (fps.is_finite() && fps > 0.0).then_some(fps);
    }
    raw.parse::<f64>().ok().filter(|f| f.is_finite() && *f > 0.0)
}
