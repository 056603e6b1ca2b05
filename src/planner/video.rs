use crate::domain::{
    CapabilitySnapshot, Container, MediaKind, Preset, ProbeSummary, VCodec, VideoTierParams,
};

use super::encoders::EncoderPicker;
use super::{StreamAction, StreamPlan};

const GIF_FPS_MIN: f64 = 5.0;
const GIF_FPS_MAX: f64 = 50.0;
const GIF_FPS_DEFAULT: f64 = 15.0;
const GIF_WIDTH_MIN: u32 = 160;
const GIF_WIDTH_MAX: u32 = 1280;
const GIF_WIDTH_DEFAULT: u32 = 480;
const GIF_DURATION_WARN_SEC: f64 = 30.0;

pub(crate) fn plan_video(
    preset: &Preset,
    summary: &ProbeSummary,
    capabilities: &CapabilitySnapshot,
    tier_params: Option<&VideoTierParams>,
    picker: &dyn EncoderPicker,
) -> StreamPlan {
    let mut plan = StreamPlan::new(StreamAction::Drop);

    if preset.video.codec == VCodec::None {
        plan.args.push("-vn".to_string());
        plan.notes.push("Video stream stripped by preset".to_string());
        return plan;
    }

    let Some(source_codec) = summary.vcodec.as_deref() else {
        plan.args.push("-vn".to_string());
        plan.warnings
            .push("Source has no video stream; video output dropped".to_string());
        return plan;
    };

    if preset.video.codec == VCodec::Copy {
        plan.action = StreamAction::Copy;
        plan.args
            .extend(["-map", "0:v:0?", "-c:v", "copy"].map(String::from));
        plan.notes
            .push("Video stream copied without re-encoding".to_string());
        return plan;
    }

    if preset.video.codec.matches_stream(source_codec) {
        plan.action = StreamAction::Copy;
        plan.args
            .extend(["-map", "0:v:0?", "-c:v", "copy"].map(String::from));
        plan.notes.push(format!(
            "Source video is already {source_codec}; reusing the stream losslessly"
        ));
        return plan;
    }

    if preset.container == Container::Gif {
        return plan_gif(summary);
    }

    plan.action = StreamAction::Transcode;
    let Some(encoder) = picker.pick_video(preset.video.codec, capabilities) else {
        plan.action = StreamAction::Drop;
        plan.args.push("-vn".to_string());
        plan.warnings
            .push("No encoder candidate for the requested video codec".to_string());
        return plan;
    };

    plan.args
        .extend(["-map", "0:v:0?", "-c:v"].map(String::from));
    plan.args.push(encoder.to_string());
    if !capabilities.video_encoders.contains(encoder) {
        plan.warnings.push(format!(
            "Encoder {encoder} is not reported by the toolchain; attempting anyway"
        ));
    }
    plan.notes
        .push(format!("Transcoding video from {source_codec} with {encoder}"));

    if preset.media_kind == MediaKind::Image {
        plan.args.extend(["-frames:v", "1"].map(String::from));
        match preset.video.codec {
            VCodec::Mjpeg => plan.args.extend(["-q:v", "2"].map(String::from)),
            VCodec::Webp => plan.args.extend(["-quality", "90"].map(String::from)),
            _ => {}
        }
        plan.notes
            .push("Capturing a single frame as a still image".to_string());
        return plan;
    }

    if let Some(params) = tier_params {
        if let Some(bitrate) = params.bitrate_kbps {
            plan.args.push("-b:v".to_string());
            plan.args.push(format!("{bitrate}k"));
        }
        if let Some(maxrate) = params.maxrate_kbps {
            plan.args.push("-maxrate".to_string());
            plan.args.push(format!("{maxrate}k"));
        }
        if let Some(bufsize) = params.bufsize_kbits {
            plan.args.push("-bufsize".to_string());
            plan.args.push(format!("{bufsize}k"));
        }
        if let Some(crf) = params.crf {
            plan.args.push("-crf".to_string());
            plan.args.push(crf.to_string());
        }
        if let Some(profile) = params.profile.as_deref() {
            let profile = if preset.video.codec == VCodec::Prores {
                normalize_prores_profile(profile)
            } else {
                profile.to_string()
            };
            plan.args.push("-profile:v".to_string());
            plan.args.push(profile);
        }
    }

    if preset.video.copy_color_metadata
        && let Some(color) = summary.color.as_ref()
    {
        if let Some(primaries) = color.primaries.as_deref() {
            plan.args.push("-color_primaries".to_string());
            plan.args.push(primaries.to_string());
        }
        if let Some(trc) = color.trc.as_deref() {
            plan.args.push("-color_trc".to_string());
            plan.args.push(trc.to_string());
        }
        if let Some(space) = color.space.as_deref() {
            plan.args.push("-colorspace".to_string());
            plan.args.push(space.to_string());
        }
        plan.notes
            .push("Source color metadata carried into the output".to_string());
    }

    plan
}

/// GIF output runs through a two-pass palette filter graph instead of a
/// conventional encoder.
fn plan_gif(summary: &ProbeSummary) -> StreamPlan {
    let mut plan = StreamPlan::new(StreamAction::Transcode);

    let fps = summary
        .fps
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(GIF_FPS_DEFAULT)
        .clamp(GIF_FPS_MIN, GIF_FPS_MAX);
    let mut width = summary
        .width
        .unwrap_or(GIF_WIDTH_DEFAULT)
        .clamp(GIF_WIDTH_MIN, GIF_WIDTH_MAX);
    width &= !1;

    let chain = format!(
        "fps={fps},scale={width}:-2:flags=lanczos,split[s0][s1];\
[s0]palettegen[p];[s1][p]paletteuse=dither=bayer:bayer_scale=3"
    );
    plan.filter_args.push("-filter_complex".to_string());
    plan.filter_args.push(chain);
    plan.notes.push(format!(
        "GIF palette pipeline at {fps} fps, {width} px wide"
    ));

    if let Some(duration) = summary.duration_sec
        && duration > GIF_DURATION_WARN_SEC
    {
        plan.warnings.push(format!(
            "Source runs {duration:.1} s; GIF output over {GIF_DURATION_WARN_SEC:.0} s will be very large"
        ));
    }

    plan
}

/// ProRes profile aliases collapse onto ffmpeg's canonical names; the
/// 4444/proxy family passes through untouched.
fn normalize_prores_profile(profile: &str) -> String {
    match profile.to_ascii_lowercase().as_str() {
        "422" | "standard" => "standard".to_string(),
        "422hq" | "hq" => "hq".to_string(),
        "422lt" | "lt" => "lt".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::resolve_preset;
    use crate::domain::Tier;
    use crate::planner::encoders::DefaultEncoderPicker;

    fn video_summary(codec: &str) -> ProbeSummary {
        ProbeSummary {
            vcodec: Some(codec.to_string()),
            width: Some(1920),
            height: Some(1080),
            fps: Some(30.0),
            duration_sec: Some(60.0),
            ..ProbeSummary::default()
        }
    }

    #[test]
    fn matching_source_codec_becomes_a_lossless_copy() {
        let preset = resolve_preset("mp4-h264").expect("preset");
        let plan = plan_video(
            preset,
            &video_summary("h264"),
            &CapabilitySnapshot::default(),
            preset.video.tiers.get(&Tier::Balanced),
            &DefaultEncoderPicker,
        );
        assert_eq!(plan.action, StreamAction::Copy);
        assert!(plan.args.contains(&"copy".to_string()));
        assert!(!plan.args.contains(&"-crf".to_string()));
    }

    #[test]
    fn transcode_emits_tier_parameters_in_stable_order() {
        let preset = resolve_preset("mp4-h264").expect("preset");
        let plan = plan_video(
            preset,
            &video_summary("vp9"),
            &CapabilitySnapshot::default(),
            preset.video.tiers.get(&Tier::Balanced),
            &DefaultEncoderPicker,
        );
        assert_eq!(plan.action, StreamAction::Transcode);
        let rendered = plan.args.join(" ");
        assert!(rendered.contains("-b:v 2500k"));
        assert!(rendered.contains("-maxrate 4000k"));
        assert!(rendered.contains("-bufsize 8000k"));
        assert!(rendered.contains("-crf 23"));
        assert!(rendered.contains("-profile:v high"));
        let b = rendered.find("-b:v").unwrap();
        let crf = rendered.find("-crf").unwrap();
        let profile = rendered.find("-profile:v").unwrap();
        assert!(b < crf && crf < profile);
    }

    #[test]
    fn missing_encoder_capability_warns_but_keeps_the_token() {
        let preset = resolve_preset("mp4-h264").expect("preset");
        let plan = plan_video(
            preset,
            &video_summary("vp9"),
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        assert!(plan.args.iter().any(|a| a == "h264_videotoolbox"));
        assert!(
            plan.warnings
                .iter()
                .any(|w| w.contains("not reported by the toolchain"))
        );
    }

    #[test]
    fn sourceless_video_drops_with_a_warning() {
        let preset = resolve_preset("mp4-h264").expect("preset");
        let plan = plan_video(
            preset,
            &ProbeSummary::default(),
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        assert_eq!(plan.action, StreamAction::Drop);
        assert_eq!(plan.args, vec!["-vn".to_string()]);
        assert!(!plan.warnings.is_empty());
    }

    #[test]
    fn gif_clamps_fps_and_width_and_warns_on_long_sources() {
        let preset = resolve_preset("gif").expect("preset");
        let summary = ProbeSummary {
            vcodec: Some("h264".to_string()),
            fps: Some(120.0),
            width: Some(4000),
            duration_sec: Some(60.0),
            ..ProbeSummary::default()
        };
        let plan = plan_video(
            preset,
            &summary,
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        let chain = plan
            .filter_args
            .iter()
            .find(|a| a.contains("palettegen"))
            .expect("filter chain");
        assert!(chain.starts_with("fps=50,scale=1280:-2:flags=lanczos"));
        assert!(chain.contains("paletteuse=dither=bayer:bayer_scale=3"));
        assert!(plan.warnings.iter().any(|w| w.contains("60.0 s")));
    }

    #[test]
    fn gif_defaults_apply_when_the_probe_is_silent() {
        let preset = resolve_preset("gif").expect("preset");
        let summary = ProbeSummary {
            vcodec: Some("h264".to_string()),
            ..ProbeSummary::default()
        };
        let plan = plan_video(
            preset,
            &summary,
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        let chain = &plan.filter_args[1];
        assert!(chain.starts_with("fps=15,scale=480:"));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn gif_width_is_forced_even_after_clamping() {
        let preset = resolve_preset("gif").expect("preset");
        let summary = ProbeSummary {
            vcodec: Some("h264".to_string()),
            width: Some(641),
            ..ProbeSummary::default()
        };
        let plan = plan_video(
            preset,
            &summary,
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        assert!(plan.filter_args[1].contains("scale=640:"));
    }

    #[test]
    fn still_image_presets_request_one_frame_with_codec_quality() {
        let preset = resolve_preset("jpg").expect("preset");
        let plan = plan_video(
            preset,
            &video_summary("h264"),
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        let rendered = plan.args.join(" ");
        assert!(rendered.contains("-frames:v 1"));
        assert!(rendered.contains("-q:v 2"));

        let webp = resolve_preset("webp").expect("preset");
        let plan = plan_video(
            webp,
            &video_summary("h264"),
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        assert!(plan.args.join(" ").contains("-quality 90"));
    }

    #[test]
    fn prores_profiles_normalize_aliases_and_preserve_the_4444_family() {
        assert_eq!(normalize_prores_profile("422"), "standard");
        assert_eq!(normalize_prores_profile("standard"), "standard");
        assert_eq!(normalize_prores_profile("422HQ"), "hq");
        assert_eq!(normalize_prores_profile("lt"), "lt");
        assert_eq!(normalize_prores_profile("4444"), "4444");
        assert_eq!(normalize_prores_profile("4444xq"), "4444xq");
        assert_eq!(normalize_prores_profile("proxy"), "proxy");
    }

    #[test]
    fn color_metadata_is_carried_when_the_preset_asks_for_it() {
        let preset = resolve_preset("mp4-h264").expect("preset");
        let mut summary = video_summary("vp9");
        summary.color = Some(crate::domain::ColorMetadata {
            primaries: Some("bt709".to_string()),
            trc: Some("bt709".to_string()),
            space: Some("bt709".to_string()),
        });
        let plan = plan_video(
            preset,
            &summary,
            &CapabilitySnapshot::default(),
            None,
            &DefaultEncoderPicker,
        );
        let rendered = plan.args.join(" ");
        assert!(rendered.contains("-color_primaries bt709"));
        assert!(rendered.contains("-color_trc bt709"));
        assert!(rendered.contains("-colorspace bt709"));
    }
}
