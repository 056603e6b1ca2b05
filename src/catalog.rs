//! Preset catalog and container compatibility rules. Both tables are
//! frozen data: no runtime mutation, no I/O.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::domain::{
    ACodec, AudioSpec, AudioTierParams, CodecSupport, Container, ContainerRule, MediaKind, Preset,
    SubtitleMode, Tier, VCodec, VideoSpec, VideoTierParams,
};

pub fn list_presets() -> &'static [Preset] {
    &PRESETS
}

pub fn resolve_preset(id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.id == id)
}

/// Compatibility rule for a target container.
pub fn container_rule(container: Container) -> &'static ContainerRule {
    match container {
        Container::Mp4 => &MP4_RULE,
        Container::Mov => &MOV_RULE,
        Container::M4a => &M4A_RULE,
        Container::Mkv => &MKV_RULE,
        Container::Webm => &WEBM_RULE,
        Container::Gif => &GIF_RULE,
        Container::Mp3 => &MP3_RULE,
        Container::Flac => &FLAC_RULE,
        Container::Wav => &WAV_RULE,
        Container::Png => &PNG_RULE,
        Container::Jpg => &JPG_RULE,
        Container::Webp => &WEBP_RULE,
    }
}

static MP4_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::H264, VCodec::Hevc, VCodec::Av1]),
    audio: CodecSupport::List(&[ACodec::Aac, ACodec::Mp3, ACodec::Opus, ACodec::Flac]),
    text_sub_codecs: &["mov_text"],
    image_sub_codecs: &[],
    requires_faststart: true,
};

static MOV_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::H264, VCodec::Hevc, VCodec::Prores]),
    audio: CodecSupport::List(&[ACodec::Aac, ACodec::Pcm16]),
    text_sub_codecs: &["mov_text"],
    image_sub_codecs: &[],
    requires_faststart: true,
};

static M4A_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[]),
    audio: CodecSupport::List(&[ACodec::Aac]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: true,
};

static MKV_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::Any,
    audio: CodecSupport::Any,
    text_sub_codecs: &["subrip", "ass", "ssa"],
    image_sub_codecs: &["hdmv_pgs_subtitle", "dvd_subtitle"],
    requires_faststart: false,
};

static WEBM_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::Vp9, VCodec::Av1]),
    audio: CodecSupport::List(&[ACodec::Opus]),
    text_sub_codecs: &["webvtt"],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static GIF_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::Gif]),
    audio: CodecSupport::List(&[]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static MP3_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[]),
    audio: CodecSupport::List(&[ACodec::Mp3]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static FLAC_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[]),
    audio: CodecSupport::List(&[ACodec::Flac]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static WAV_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[]),
    audio: CodecSupport::List(&[ACodec::Pcm16]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static PNG_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::Png]),
    audio: CodecSupport::List(&[]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static JPG_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::Mjpeg]),
    audio: CodecSupport::List(&[]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

static WEBP_RULE: ContainerRule = ContainerRule {
    video: CodecSupport::List(&[VCodec::Webp]),
    audio: CodecSupport::List(&[]),
    text_sub_codecs: &[],
    image_sub_codecs: &[],
    requires_faststart: false,
};

fn video_tiers(entries: &[(Tier, VideoTierParams)]) -> BTreeMap<Tier, VideoTierParams> {
    entries.iter().cloned().collect()
}

fn audio_tiers(entries: &[(Tier, u32)]) -> BTreeMap<Tier, AudioTierParams> {
    entries
        .iter()
        .map(|(tier, bitrate)| {
            (
                *tier,
                AudioTierParams {
                    bitrate_kbps: Some(*bitrate),
                    quality: None,
                },
            )
        })
        .collect()
}

fn crf_tier(crf: u32) -> VideoTierParams {
    VideoTierParams {
        crf: Some(crf),
        ..VideoTierParams::default()
    }
}

fn profile_tier(profile: &str) -> VideoTierParams {
    VideoTierParams {
        profile: Some(profile.to_string()),
        ..VideoTierParams::default()
    }
}

static PRESETS: Lazy<Vec<Preset>> = Lazy::new(|| {
    vec![
        Preset {
            id: "mp4-remux".to_string(),
            label: "MP4 passthrough remux".to_string(),
            container: Container::Mp4,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Copy,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Copy,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Keep,
            remux_only: true,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "mp4-h264".to_string(),
            label: "MP4 (H.264 / AAC)".to_string(),
            container: Container::Mp4,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::H264,
                tiers: video_tiers(&[
                    (
                        Tier::Fast,
                        VideoTierParams {
                            bitrate_kbps: Some(1500),
                            maxrate_kbps: Some(2500),
                            bufsize_kbits: Some(5000),
                            crf: Some(28),
                            profile: Some("main".to_string()),
                        },
                    ),
                    (
                        Tier::Balanced,
                        VideoTierParams {
                            bitrate_kbps: Some(2500),
                            maxrate_kbps: Some(4000),
                            bufsize_kbits: Some(8000),
                            crf: Some(23),
                            profile: Some("high".to_string()),
                        },
                    ),
                    (
                        Tier::High,
                        VideoTierParams {
                            bitrate_kbps: Some(6000),
                            maxrate_kbps: Some(9000),
                            bufsize_kbits: Some(18000),
                            crf: Some(18),
                            profile: Some("high".to_string()),
                        },
                    ),
                ]),
                copy_color_metadata: true,
            },
            audio: AudioSpec {
                codec: ACodec::Aac,
                default_bitrate_kbps: Some(128),
                tiers: audio_tiers(&[(Tier::Fast, 96), (Tier::Balanced, 128), (Tier::High, 192)]),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Convert,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "mp4-hevc".to_string(),
            label: "MP4 (HEVC / AAC)".to_string(),
            container: Container::Mp4,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Hevc,
                tiers: video_tiers(&[
                    (Tier::Fast, crf_tier(30)),
                    (Tier::Balanced, crf_tier(26)),
                    (Tier::High, crf_tier(21)),
                ]),
                copy_color_metadata: true,
            },
            audio: AudioSpec {
                codec: ACodec::Aac,
                default_bitrate_kbps: Some(160),
                tiers: audio_tiers(&[(Tier::Fast, 128), (Tier::Balanced, 160), (Tier::High, 256)]),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Convert,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "webm-vp9".to_string(),
            label: "WebM (VP9 / Opus)".to_string(),
            container: Container::Webm,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Vp9,
                tiers: video_tiers(&[
                    (Tier::Fast, crf_tier(36)),
                    (Tier::Balanced, crf_tier(31)),
                    (Tier::High, crf_tier(24)),
                ]),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Opus,
                default_bitrate_kbps: Some(128),
                tiers: audio_tiers(&[(Tier::Fast, 96), (Tier::Balanced, 128), (Tier::High, 192)]),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "mkv-av1".to_string(),
            label: "MKV (AV1 / Opus)".to_string(),
            container: Container::Mkv,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Av1,
                tiers: video_tiers(&[
                    (Tier::Fast, crf_tier(36)),
                    (Tier::Balanced, crf_tier(30)),
                    (Tier::High, crf_tier(24)),
                ]),
                copy_color_metadata: true,
            },
            audio: AudioSpec {
                codec: ACodec::Opus,
                default_bitrate_kbps: Some(128),
                tiers: audio_tiers(&[(Tier::Fast, 96), (Tier::Balanced, 128), (Tier::High, 192)]),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Keep,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "mov-prores".to_string(),
            label: "MOV (ProRes 422 / PCM)".to_string(),
            container: Container::Mov,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Prores,
                tiers: video_tiers(&[
                    (Tier::Fast, profile_tier("422lt")),
                    (Tier::Balanced, profile_tier("422")),
                    (Tier::High, profile_tier("422hq")),
                ]),
                copy_color_metadata: true,
            },
            audio: AudioSpec {
                codec: ACodec::Pcm16,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "gif".to_string(),
            label: "Animated GIF".to_string(),
            container: Container::Gif,
            media_kind: MediaKind::Video,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Gif,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::None,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "m4a-aac".to_string(),
            label: "M4A (AAC)".to_string(),
            container: Container::M4a,
            media_kind: MediaKind::Audio,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::None,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Aac,
                default_bitrate_kbps: Some(192),
                tiers: audio_tiers(&[(Tier::Fast, 128), (Tier::Balanced, 192), (Tier::High, 256)]),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "mp3".to_string(),
            label: "MP3".to_string(),
            container: Container::Mp3,
            media_kind: MediaKind::Audio,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::None,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Mp3,
                default_bitrate_kbps: Some(192),
                tiers: audio_tiers(&[(Tier::Fast, 128), (Tier::Balanced, 192), (Tier::High, 320)]),
                stereo_only: true,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "flac".to_string(),
            label: "FLAC (lossless)".to_string(),
            container: Container::Flac,
            media_kind: MediaKind::Audio,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::None,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Flac,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "wav-pcm".to_string(),
            label: "WAV (PCM 16-bit)".to_string(),
            container: Container::Wav,
            media_kind: MediaKind::Audio,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::None,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::Pcm16,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "png".to_string(),
            label: "PNG still".to_string(),
            container: Container::Png,
            media_kind: MediaKind::Image,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Png,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::None,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "jpg".to_string(),
            label: "JPEG still".to_string(),
            container: Container::Jpg,
            media_kind: MediaKind::Image,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Mjpeg,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::None,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
        Preset {
            id: "webp".to_string(),
            label: "WebP still".to_string(),
            container: Container::Webp,
            media_kind: MediaKind::Image,
            source_containers: Vec::new(),
            video: VideoSpec {
                codec: VCodec::Webp,
                tiers: BTreeMap::new(),
                copy_color_metadata: false,
            },
            audio: AudioSpec {
                codec: ACodec::None,
                default_bitrate_kbps: None,
                tiers: BTreeMap::new(),
                stereo_only: false,
            },
            subtitles: SubtitleMode::Drop,
            remux_only: false,
            experimental: false,
            output_extension: None,
        },
    ]
});
