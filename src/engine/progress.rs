//! Parsing helpers for the encoder's `-progress pipe:2` channel and its
//! metadata header lines.

/// Facts extracted from a single stderr line. A line with every field
/// empty is unrelated stderr and belongs in the job log instead.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct ParsedProgress {
    pub processed_seconds: Option<f64>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    /// `Some(true)` on `progress=end`, `Some(false)` on `progress=continue`.
    pub marker: Option<bool>,
}

impl ParsedProgress {
    pub(crate) fn is_empty(&self) -> bool {
        self.processed_seconds.is_none()
            && self.fps.is_none()
            && self.speed.is_none()
            && self.marker.is_none()
    }
}

/// Scan one stderr line for progress-channel tokens. Handles both the
/// `key=value` lines of the progress channel and the composite
/// `frame=.. time=.. speed=..` stats line older builds emit.
pub(crate) fn scan_progress_line(line: &str) -> ParsedProgress {
    let mut parsed = ParsedProgress::default();

    for token in line.split_whitespace() {
        if let Some(rest) = token.strip_prefix("out_time_ms=") {
            if let Ok(us) = rest.parse::<f64>() {
                parsed.processed_seconds = Some(us / 1_000_000.0);
            }
        } else if let Some(rest) = token.strip_prefix("out_time=") {
            if let Some(seconds) = parse_clock_or_seconds(rest) {
                parsed.processed_seconds = Some(seconds);
            }
        } else if let Some(rest) = token.strip_prefix("time=") {
            if let Some(seconds) = parse_clock_or_seconds(rest) {
                parsed.processed_seconds = Some(seconds);
            }
        } else if let Some(rest) = token.strip_prefix("fps=") {
            if let Ok(fps) = rest.parse::<f64>()
                && fps.is_finite()
                && fps >= 0.0
            {
                parsed.fps = Some(fps);
            }
        } else if let Some(rest) = token.strip_prefix("speed=") {
            let value = rest.trim_end_matches('x');
            if let Ok(speed) = value.parse::<f64>()
                && speed.is_finite()
            {
                parsed.speed = Some(speed);
            }
        } else if let Some(rest) = token.strip_prefix("progress=") {
            parsed.marker = Some(rest.eq_ignore_ascii_case("end"));
        }
    }

    parsed
}

/// Timestamps on this channel come in two shapes: plain fractional
/// seconds and `HH:MM:SS.frac` clock stamps. Walking the colon groups
/// right-to-left gives each one its place value (1, 60, 3600), which
/// covers both shapes in one pass. Unparseable stamps yield `None` so a
/// garbled line never masquerades as progress.
pub(crate) fn parse_clock_or_seconds(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut total = 0.0;
    let mut place = 1.0;
    for (index, group) in raw.rsplit(':').enumerate() {
        if index > 2 {
            return None;
        }
        total += group.parse::<f64>().ok()? * place;
        place *= 60.0;
    }
    total.is_finite().then_some(total)
}

/// Pull a duration out of the encoder's `Duration: HH:MM:SS.xx,` metadata
/// header. Used to backfill an unknown source duration so progress ratios
/// still populate.
pub(crate) fn parse_duration_from_metadata_line(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    parse_clock_or_seconds(stamp).filter(|seconds| *seconds > 0.0)
}

pub(crate) fn compute_ratio(total_duration: Option<f64>, elapsed_seconds: f64) -> Option<f64> {
    let total = total_duration.filter(|t| t.is_finite() && *t > 0.0)?;
    let elapsed = if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
        elapsed_seconds
    } else {
        0.0
    };
    Some((elapsed / total).clamp(0.0, 1.0))
}

pub(crate) fn compute_eta(
    total_duration: Option<f64>,
    elapsed_seconds: f64,
    speed: Option<f64>,
) -> Option<f64> {
    let total = total_duration.filter(|t| t.is_finite() && *t > 0.0)?;
    let speed = speed.filter(|s| s.is_finite() && *s > 0.0)?;
    let remaining = (total - elapsed_seconds).max(0.0);
    Some(remaining / speed)
}
