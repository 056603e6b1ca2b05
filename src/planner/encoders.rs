//! Encoder selection strategy. Hardware-accelerated variants lead each
//! preference list; the first encoder present in the capability snapshot
//! wins, and the list head is the fallback when none are reported.

use crate::domain::{ACodec, CapabilitySnapshot, VCodec};

pub trait EncoderPicker {
    fn pick_video(&self, codec: VCodec, capabilities: &CapabilitySnapshot)
    -> Option<&'static str>;
    fn pick_audio(&self, codec: ACodec, capabilities: &CapabilitySnapshot)
    -> Option<&'static str>;
}

pub(crate) fn video_preference(codec: VCodec) -> &'static [&'static str] {
    match codec {
        VCodec::H264 => &["h264_videotoolbox", "h264_qsv", "h264_nvenc", "libx264"],
        VCodec::Hevc => &["hevc_videotoolbox", "hevc_qsv", "hevc_nvenc", "libx265"],
        VCodec::Vp9 => &["libvpx-vp9"],
        VCodec::Av1 => &["av1_qsv", "av1_nvenc", "libsvtav1", "libaom-av1"],
        VCodec::Prores => &["prores_videotoolbox", "prores_ks", "prores"],
        VCodec::Gif => &["gif"],
        VCodec::Png => &["png"],
        VCodec::Mjpeg => &["mjpeg"],
        VCodec::Webp => &["libwebp"],
        VCodec::Copy | VCodec::None => &[],
    }
}

pub(crate) fn audio_preference(codec: ACodec) -> &'static [&'static str] {
    match codec {
        ACodec::Aac => &["aac_at", "aac"],
        ACodec::Mp3 => &["libmp3lame"],
        ACodec::Opus => &["libopus"],
        ACodec::Flac => &["flac"],
        ACodec::Pcm16 => &["pcm_s16le"],
        ACodec::Copy | ACodec::None => &[],
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEncoderPicker;

impl EncoderPicker for DefaultEncoderPicker {
    fn pick_video(
        &self,
        codec: VCodec,
        capabilities: &CapabilitySnapshot,
    ) -> Option<&'static str> {
        let preferences = video_preference(codec);
        preferences
            .iter()
            .find(|name| capabilities.video_encoders.contains(**name))
            .or_else(|| preferences.first())
            .copied()
    }

    fn pick_audio(
        &self,
        codec: ACodec,
        capabilities: &CapabilitySnapshot,
    ) -> Option<&'static str> {
        let preferences = audio_preference(codec);
        preferences
            .iter()
            .find(|name| capabilities.audio_encoders.contains(**name))
            .or_else(|| preferences.first())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with(video: &[&str], audio: &[&str]) -> CapabilitySnapshot {
        CapabilitySnapshot {
            video_encoders: video.iter().map(|s| s.to_string()).collect(),
            audio_encoders: audio.iter().map(|s| s.to_string()).collect(),
            ..CapabilitySnapshot::default()
        }
    }

    #[test]
    fn prefers_hardware_encoders_when_reported() {
        let picker = DefaultEncoderPicker;
        let caps = caps_with(&["libx264", "h264_videotoolbox"], &[]);
        assert_eq!(
            picker.pick_video(VCodec::H264, &caps),
            Some("h264_videotoolbox")
        );
    }

    #[test]
    fn falls_back_to_software_encoder_present_in_snapshot() {
        let picker = DefaultEncoderPicker;
        let caps = caps_with(&["libx264"], &[]);
        assert_eq!(picker.pick_video(VCodec::H264, &caps), Some("libx264"));
    }

    #[test]
    fn falls_back_to_list_head_when_nothing_is_reported() {
        let picker = DefaultEncoderPicker;
        let caps = CapabilitySnapshot::default();
        assert_eq!(
            picker.pick_video(VCodec::H264, &caps),
            Some("h264_videotoolbox")
        );
        assert_eq!(picker.pick_audio(ACodec::Opus, &caps), Some("libopus"));
    }

    #[test]
    fn sentinel_codecs_have_no_encoder() {
        let picker = DefaultEncoderPicker;
        let caps = CapabilitySnapshot::default();
        assert_eq!(picker.pick_video(VCodec::Copy, &caps), None);
        assert_eq!(picker.pick_video(VCodec::None, &caps), None);
        assert_eq!(picker.pick_audio(ACodec::Copy, &caps), None);
    }

    #[test]
    fn audio_picks_platform_encoder_over_generic_when_available() {
        let picker = DefaultEncoderPicker;
        let caps = caps_with(&[], &["aac", "aac_at"]);
        assert_eq!(picker.pick_audio(ACodec::Aac, &caps), Some("aac_at"));
    }
}
