use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

/// Milliseconds since the UNIX epoch, used for every job timestamp.
pub fn now_millis() -> u64 {
    let ms = chrono::Utc::now().timestamp_millis();
    if ms < 0 { 0 } else { ms as u64 }
}

/// Output containers the catalog knows how to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mov,
    M4a,
    Mkv,
    Webm,
    Gif,
    Mp3,
    Flac,
    Wav,
    Png,
    Jpg,
    Webp,
}

impl Container {
    /// Muxer name passed to `-f`, when the container needs one pinned.
    pub fn muxer(self) -> Option<&'static str> {
        match self {
            Container::Mp4 => Some("mp4"),
            Container::Mov => Some("mov"),
            Container::M4a => Some("ipod"),
            Container::Mkv => Some("matroska"),
            Container::Webm => Some("webm"),
            Container::Gif => Some("gif"),
            Container::Mp3 => Some("mp3"),
            Container::Flac => Some("flac"),
            Container::Wav => Some("wav"),
            Container::Png | Container::Jpg | Container::Webp => Some("image2"),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
            Container::M4a => "m4a",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
            Container::Gif => "gif",
            Container::Mp3 => "mp3",
            Container::Flac => "flac",
            Container::Wav => "wav",
            Container::Png => "png",
            Container::Jpg => "jpg",
            Container::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

/// Video codec selector. `Copy` passes encoded packets through unchanged;
/// `None` strips the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VCodec {
    H264,
    Hevc,
    Vp9,
    Av1,
    Prores,
    Gif,
    Png,
    Mjpeg,
    Webp,
    Copy,
    None,
}

impl VCodec {
    /// Codec names ffprobe reports for a stream already encoded this way.
    fn stream_names(self) -> &'static [&'static str] {
        match self {
            VCodec::H264 => &["h264"],
            VCodec::Hevc => &["hevc", "h265"],
            VCodec::Vp9 => &["vp9"],
            VCodec::Av1 => &["av1"],
            VCodec::Prores => &["prores"],
            VCodec::Gif => &["gif"],
            VCodec::Png => &["png"],
            VCodec::Mjpeg => &["mjpeg"],
            VCodec::Webp => &["webp"],
            VCodec::Copy | VCodec::None => &[],
        }
    }

    pub fn matches_stream(self, codec_name: &str) -> bool {
        self.stream_names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(codec_name))
    }

    /// Codecs expensive enough that the scheduler runs them alone.
    pub fn is_exclusive(self) -> bool {
        matches!(self, VCodec::Av1 | VCodec::Prores)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ACodec {
    Aac,
    Mp3,
    Opus,
    Flac,
    #[serde(rename = "pcm_s16le")]
    Pcm16,
    Copy,
    None,
}

impl ACodec {
    fn stream_names(self) -> &'static [&'static str] {
        match self {
            ACodec::Aac => &["aac"],
            ACodec::Mp3 => &["mp3"],
            ACodec::Opus => &["opus"],
            ACodec::Flac => &["flac"],
            ACodec::Pcm16 => &["pcm_s16le"],
            ACodec::Copy | ACodec::None => &[],
        }
    }

    pub fn matches_stream(self, codec_name: &str) -> bool {
        self.stream_names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(codec_name))
    }
}

/// Quality profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Balanced,
    High,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Balanced => "balanced",
            Tier::High => "high",
        }
    }

    /// Fallback order when the requested tier has no entry in a preset.
    pub const FALLBACK_ORDER: [Tier; 3] = [Tier::Balanced, Tier::Fast, Tier::High];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTierParams {
    pub bitrate_kbps: Option<u32>,
    pub maxrate_kbps: Option<u32>,
    pub bufsize_kbits: Option<u32>,
    pub crf: Option<u32>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSpec {
    pub codec: VCodec,
    #[serde(default)]
    pub tiers: BTreeMap<Tier, VideoTierParams>,
    /// Re-emit source color primaries/transfer/matrix on transcode.
    #[serde(default)]
    pub copy_color_metadata: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTierParams {
    pub bitrate_kbps: Option<u32>,
    /// Variable-quality scale mapped to `-q:a` for encoders that take one.
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSpec {
    pub codec: ACodec,
    pub default_bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub tiers: BTreeMap<Tier, AudioTierParams>,
    /// Downmix to stereo via `-ac 2`.
    #[serde(default)]
    pub stereo_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    Keep,
    Convert,
    Burn,
    Drop,
}

/// Immutable conversion recipe. Presets are authored as data in the catalog
/// and never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub label: String,
    pub container: Container,
    pub media_kind: MediaKind,
    /// Accepted source containers; empty means any input is accepted.
    #[serde(default)]
    pub source_containers: Vec<Container>,
    pub video: VideoSpec,
    pub audio: AudioSpec,
    pub subtitles: SubtitleMode,
    #[serde(default)]
    pub remux_only: bool,
    #[serde(default)]
    pub experimental: bool,
    /// Overrides the container's default file extension when set.
    pub output_extension: Option<String>,
}

/// Per-container codec admissibility.
#[derive(Debug, Clone, Copy)]
pub enum CodecSupport<T: 'static> {
    Any,
    List(&'static [T]),
}

impl<T: PartialEq + Copy> CodecSupport<T> {
    pub fn allows(&self, codec: T) -> bool {
        match self {
            CodecSupport::Any => true,
            CodecSupport::List(list) => list.contains(&codec),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContainerRule {
    pub video: CodecSupport<VCodec>,
    pub audio: CodecSupport<ACodec>,
    /// Text subtitle codecs the container can carry (empty: none).
    pub text_sub_codecs: &'static [&'static str],
    /// Image subtitle codecs the container can carry (empty: none).
    pub image_sub_codecs: &'static [&'static str],
    pub requires_faststart: bool,
}

impl ContainerRule {
    pub fn accepts_text_subs(&self) -> bool {
        !self.text_sub_codecs.is_empty()
    }

    pub fn accepts_image_subs(&self) -> bool {
        !self.image_sub_codecs.is_empty()
    }

    pub fn supports_mov_text(&self) -> bool {
        self.text_sub_codecs.contains(&"mov_text")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorMetadata {
    pub primaries: Option<String>,
    pub trc: Option<String>,
    pub space: Option<String>,
}

impl ColorMetadata {
    pub fn is_empty(&self) -> bool {
        self.primaries.is_none() && self.trc.is_none() && self.space.is_none()
    }
}

/// Normalized view of a probed source file. Unknown facts stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSummary {
    pub duration_sec: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub channels: Option<u32>,
    #[serde(default)]
    pub has_text_subs: bool,
    #[serde(default)]
    pub has_image_subs: bool,
    pub color: Option<ColorMetadata>,
}

/// Point-in-time summary of what the toolchain build reports. Advisory
/// input to planning only; an empty snapshot never blocks a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySnapshot {
    pub video_encoders: BTreeSet<String>,
    pub audio_encoders: BTreeSet<String>,
    pub muxers: BTreeSet<String>,
    pub filters: BTreeSet<String>,
}

impl CapabilitySnapshot {
    pub fn is_empty(&self) -> bool {
        self.video_encoders.is_empty()
            && self.audio_encoders.is_empty()
            && self.muxers.is_empty()
            && self.filters.is_empty()
    }
}

/// Deterministic output of the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerDecision {
    pub preset_id: String,
    /// Ordered encoder command tokens, always prefixed by
    /// `-progress pipe:2 -nostats`. The runner owns `-y`, the input path
    /// splice, `-nostdin` and the output path.
    pub args: Vec<String>,
    /// Prose explanations of each decision, for the job log.
    pub notes: Vec<String>,
    /// Policy violations expected at runtime, shown as badges.
    pub warnings: Vec<String>,
    /// True when every stream action is a copy.
    pub remux_only: bool,
    /// True when the selected video codec must run alone.
    pub exclusive: bool,
    pub tier: Tier,
    #[serde(default)]
    pub tier_fallback: bool,
}

/// Stable job identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub processed_seconds: f64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    /// processedSeconds / source duration, when the duration is known.
    pub ratio: Option<f64>,
    pub eta_seconds: Option<f64>,
}

/// Flat discriminant of `JobState`, used by the lifecycle table and the
/// repository's status index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Queued,
    Probing,
    Planning,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Queued,
        Stage::Probing,
        Stage::Planning,
        Stage::Running,
        Stage::Completed,
        Stage::Failed,
        Stage::Cancelled,
    ];

    pub const TERMINAL: [Stage; 3] = [Stage::Completed, Stage::Failed, Stage::Cancelled];

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::Cancelled)
    }
}

/// Job lifecycle state. Per-state payloads are part of the contract: the
/// progress block only exists while running, the output path only once
/// completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum JobState {
    Queued {
        enqueued_at: u64,
    },
    Probing {
        enqueued_at: u64,
        started_at: u64,
    },
    Planning {
        enqueued_at: u64,
        started_at: u64,
        summary: ProbeSummary,
    },
    Running {
        enqueued_at: u64,
        started_at: u64,
        progress: JobProgress,
    },
    Completed {
        enqueued_at: u64,
        started_at: u64,
        finished_at: u64,
        output_path: String,
    },
    Failed {
        enqueued_at: u64,
        started_at: Option<u64>,
        finished_at: u64,
        error: String,
        code: Option<ErrorCode>,
    },
    Cancelled {
        enqueued_at: u64,
        started_at: Option<u64>,
        finished_at: u64,
    },
}

impl JobState {
    pub fn stage(&self) -> Stage {
        match self {
            JobState::Queued { .. } => Stage::Queued,
            JobState::Probing { .. } => Stage::Probing,
            JobState::Planning { .. } => Stage::Planning,
            JobState::Running { .. } => Stage::Running,
            JobState::Completed { .. } => Stage::Completed,
            JobState::Failed { .. } => Stage::Failed,
            JobState::Cancelled { .. } => Stage::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_terminal()
    }

    pub fn enqueued_at(&self) -> u64 {
        match self {
            JobState::Queued { enqueued_at }
            | JobState::Probing { enqueued_at, .. }
            | JobState::Planning { enqueued_at, .. }
            | JobState::Running { enqueued_at, .. }
            | JobState::Completed { enqueued_at, .. }
            | JobState::Failed { enqueued_at, .. }
            | JobState::Cancelled { enqueued_at, .. } => *enqueued_at,
        }
    }

    pub fn started_at(&self) -> Option<u64> {
        match self {
            JobState::Queued { .. } => None,
            JobState::Probing { started_at, .. }
            | JobState::Planning { started_at, .. }
            | JobState::Running { started_at, .. }
            | JobState::Completed { started_at, .. } => Some(*started_at),
            JobState::Failed { started_at, .. } | JobState::Cancelled { started_at, .. } => {
                *started_at
            }
        }
    }
}

/// Rolling window of recent log lines kept per job.
pub const JOB_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    /// Normalized absolute source path. At most one non-terminal job per
    /// path exists at a time.
    pub path: String,
    pub preset_id: String,
    pub tier: Tier,
    /// Whether this job must run alone. Set from the preset's codec on
    /// admission and refined from the planner decision once available.
    pub exclusive: bool,
    pub summary: Option<ProbeSummary>,
    pub decision: Option<PlannerDecision>,
    pub output_path: Option<String>,
    /// Quoted invocation for copy/paste reproduction from the UI.
    pub command_line: Option<String>,
    /// Bounded tail of planner notes and toolchain stderr.
    pub logs: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub state: JobState,
}

impl JobRecord {
    pub fn new(id: JobId, path: String, preset_id: String, tier: Tier, exclusive: bool) -> Self {
        let now = now_millis();
        Self {
            id,
            path,
            preset_id,
            tier,
            exclusive,
            summary: None,
            decision: None,
            output_path: None,
            command_line: None,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
            state: JobState::Queued { enqueued_at: now },
        }
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Append to the bounded log, evicting the oldest lines past capacity.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        if self.logs.len() > JOB_LOG_CAPACITY {
            let excess = self.logs.len() - JOB_LOG_CAPACITY;
            self.logs.drain(..excess);
        }
    }
}

/// Result of a batch admission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAdmission {
    pub accepted: Vec<JobId>,
    pub duplicates: Vec<String>,
}
