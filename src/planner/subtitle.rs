use crate::domain::{ContainerRule, ProbeSummary, SubtitleMode};

use super::{StreamAction, StreamPlan};

/// Image subtitle codecs dropped with negative maps when converting text
/// subtitles for containers that cannot carry bitmap tracks.
const IMAGE_SUB_DROP_CODECS: &[&str] = &["hdmv_pgs_subtitle", "dvd_subtitle"];

pub(crate) fn plan_subtitles(
    mode: SubtitleMode,
    summary: &ProbeSummary,
    rule: &ContainerRule,
) -> StreamPlan {
    match mode {
        SubtitleMode::Keep => plan_keep(summary, rule),
        SubtitleMode::Convert => plan_convert(summary, rule),
        SubtitleMode::Burn => {
            let mut plan = StreamPlan::new(StreamAction::Drop);
            plan.args.push("-sn".to_string());
            plan.warnings.push(
                "Subtitle burn-in requested: the execution layer must inject a subtitles= filter"
                    .to_string(),
            );
            plan
        }
        SubtitleMode::Drop => {
            let mut plan = StreamPlan::new(StreamAction::Drop);
            plan.args.push("-sn".to_string());
            plan.notes.push("Subtitle streams dropped".to_string());
            plan
        }
    }
}

fn plan_keep(summary: &ProbeSummary, rule: &ContainerRule) -> StreamPlan {
    let mut plan = StreamPlan::new(StreamAction::Copy);
    plan.args
        .extend(["-map", "0:s?", "-c:s", "copy"].map(String::from));
    if summary.has_text_subs && !rule.accepts_text_subs() {
        plan.warnings
            .push("Target container cannot carry the source's text subtitles".to_string());
    }
    if summary.has_image_subs && !rule.accepts_image_subs() {
        plan.warnings
            .push("Target container cannot carry the source's image subtitles".to_string());
    }
    plan
}

fn plan_convert(summary: &ProbeSummary, rule: &ContainerRule) -> StreamPlan {
    if summary.has_text_subs && rule.supports_mov_text() {
        let mut plan = StreamPlan::new(StreamAction::Transcode);
        plan.args
            .extend(["-map", "0:s?", "-c:s", "mov_text"].map(String::from));
        plan.notes
            .push("Converting text subtitles to mov_text".to_string());
        if summary.has_image_subs {
            for codec in IMAGE_SUB_DROP_CODECS {
                plan.args.push("-map".to_string());
                plan.args.push(format!("-0:s:m:codec:{codec}?"));
            }
            plan.warnings
                .push("Image-based subtitle streams cannot convert and were dropped".to_string());
        }
        return plan;
    }

    let mut plan = StreamPlan::new(StreamAction::Drop);
    plan.args.push("-sn".to_string());
    if summary.has_image_subs && !summary.has_text_subs {
        plan.warnings.push(
            "Only image-based subtitles present; conversion downgraded to drop".to_string(),
        );
    } else if summary.has_text_subs {
        plan.warnings.push(
            "Target container lacks mov_text support; conversion downgraded to drop".to_string(),
        );
    } else {
        plan.notes
            .push("No subtitle streams detected in the source".to_string());
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::container_rule;
    use crate::domain::Container;

    fn summary(text: bool, image: bool) -> ProbeSummary {
        ProbeSummary {
            has_text_subs: text,
            has_image_subs: image,
            ..ProbeSummary::default()
        }
    }

    #[test]
    fn keep_copies_streams_and_warns_on_forbidden_kinds() {
        let plan = plan_subtitles(
            SubtitleMode::Keep,
            &summary(false, true),
            container_rule(Container::Mp4),
        );
        assert_eq!(plan.action, StreamAction::Copy);
        assert_eq!(
            plan.args,
            ["-map", "0:s?", "-c:s", "copy"].map(String::from).to_vec()
        );
        assert!(plan.warnings.iter().any(|w| w.contains("image subtitles")));
    }

    #[test]
    fn keep_in_mkv_accepts_both_kinds_without_warning() {
        let plan = plan_subtitles(
            SubtitleMode::Keep,
            &summary(true, true),
            container_rule(Container::Mkv),
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn convert_emits_mov_text_and_drops_image_tracks() {
        let plan = plan_subtitles(
            SubtitleMode::Convert,
            &summary(true, true),
            container_rule(Container::Mp4),
        );
        assert_eq!(plan.action, StreamAction::Transcode);
        let rendered = plan.args.join(" ");
        assert!(rendered.contains("-c:s mov_text"));
        assert!(rendered.contains("-0:s:m:codec:hdmv_pgs_subtitle?"));
        assert!(rendered.contains("-0:s:m:codec:dvd_subtitle?"));
    }

    #[test]
    fn convert_downgrades_to_drop_when_only_image_subs_exist() {
        let plan = plan_subtitles(
            SubtitleMode::Convert,
            &summary(false, true),
            container_rule(Container::Mp4),
        );
        assert_eq!(plan.action, StreamAction::Drop);
        assert_eq!(plan.args, vec!["-sn".to_string()]);
        assert!(plan.warnings.iter().any(|w| w.contains("image-based")));
        assert!(!plan.args.iter().any(|a| a.contains("mov_text")));
    }

    #[test]
    fn convert_downgrades_when_the_container_lacks_mov_text() {
        let plan = plan_subtitles(
            SubtitleMode::Convert,
            &summary(true, false),
            container_rule(Container::Webm),
        );
        assert_eq!(plan.action, StreamAction::Drop);
        assert!(plan.warnings.iter().any(|w| w.contains("mov_text")));
    }

    #[test]
    fn burn_signals_the_execution_layer_and_strips_embedded_tracks() {
        let plan = plan_subtitles(
            SubtitleMode::Burn,
            &summary(true, false),
            container_rule(Container::Mp4),
        );
        assert_eq!(plan.args, vec!["-sn".to_string()]);
        assert!(plan.warnings.iter().any(|w| w.contains("subtitles= filter")));
    }

    #[test]
    fn drop_is_quiet() {
        let plan = plan_subtitles(
            SubtitleMode::Drop,
            &summary(true, true),
            container_rule(Container::Mp4),
        );
        assert_eq!(plan.args, vec!["-sn".to_string()]);
        assert!(plan.warnings.is_empty());
    }
}
