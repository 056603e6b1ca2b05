use crate::domain::{ACodec, AudioTierParams, CapabilitySnapshot, Preset, ProbeSummary};

use super::encoders::EncoderPicker;
use super::{StreamAction, StreamPlan};

pub(crate) fn plan_audio(
    preset: &Preset,
    summary: &ProbeSummary,
    capabilities: &CapabilitySnapshot,
    tier_params: Option<&AudioTierParams>,
    picker: &dyn EncoderPicker,
) -> StreamPlan {
    let mut plan = StreamPlan::new(StreamAction::Drop);

    if preset.audio.codec == ACodec::None {
        plan.args.push("-an".to_string());
        plan.notes.push("Audio stream stripped by preset".to_string());
        return plan;
    }

    let Some(source_codec) = summary.acodec.as_deref() else {
        plan.args.push("-an".to_string());
        plan.warnings
            .push("Source has no audio stream; audio output dropped".to_string());
        return plan;
    };

    if preset.audio.codec == ACodec::Copy {
        plan.action = StreamAction::Copy;
        plan.args
            .extend(["-map", "0:a:0?", "-c:a", "copy"].map(String::from));
        plan.notes
            .push("Audio stream copied without re-encoding".to_string());
        return plan;
    }

    if preset.audio.codec.matches_stream(source_codec) {
        plan.action = StreamAction::Copy;
        plan.args
            .extend(["-map", "0:a:0?", "-c:a", "copy"].map(String::from));
        plan.notes.push(format!(
            "Source audio is already {source_codec}; reusing the stream losslessly"
        ));
        return plan;
    }

    plan.action = StreamAction::Transcode;
    let Some(encoder) = picker.pick_audio(preset.audio.codec, capabilities) else {
        plan.action = StreamAction::Drop;
        plan.args.push("-an".to_string());
        plan.warnings
            .push("No encoder candidate for the requested audio codec".to_string());
        return plan;
    };

    plan.args
        .extend(["-map", "0:a:0?", "-c:a"].map(String::from));
    plan.args.push(encoder.to_string());
    if !capabilities.audio_encoders.contains(encoder) {
        plan.warnings.push(format!(
            "Encoder {encoder} is not reported by the toolchain; attempting anyway"
        ));
    }
    plan.notes
        .push(format!("Transcoding audio from {source_codec} with {encoder}"));

    let bitrate = tier_params
        .and_then(|p| p.bitrate_kbps)
        .or(preset.audio.default_bitrate_kbps);
    if let Some(bitrate) = bitrate {
        plan.args.push("-b:a".to_string());
        plan.args.push(format!("{bitrate}k"));
    }
    if let Some(quality) = tier_params.and_then(|p| p.quality) {
        plan.args.push("-q:a".to_string());
        plan.args.push(quality.to_string());
    }
    if preset.audio.stereo_only {
        plan.args.extend(["-ac", "2"].map(String::from));
        plan.notes.push("Downmixing audio to stereo".to_string());
    }

    plan
}
