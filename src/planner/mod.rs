//! Planner: turns (preset, probe summary, capabilities, tier) into a
//! deterministic, capability-validated token vector plus human-readable
//! notes and warnings. Pure by contract: no I/O, no subprocess, no clock.

mod audio;
pub mod args;
pub mod encoders;
mod subtitle;
mod tier;
mod video;

pub use args::{assemble_invocation, format_command_for_log};
pub use encoders::{DefaultEncoderPicker, EncoderPicker};

use crate::catalog::container_rule;
use crate::domain::{CapabilitySnapshot, PlannerDecision, Preset, ProbeSummary, Tier};

use args::ArgBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamAction {
    Copy,
    Transcode,
    Drop,
}

pub(crate) struct StreamPlan {
    pub action: StreamAction,
    pub args: Vec<String>,
    /// Filter-graph tokens, appended after the container group.
    pub filter_args: Vec<String>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl StreamPlan {
    pub(crate) fn new(action: StreamAction) -> Self {
        Self {
            action,
            args: Vec::new(),
            filter_args: Vec::new(),
            notes: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

pub fn plan_job(
    preset: &Preset,
    summary: &ProbeSummary,
    capabilities: &CapabilitySnapshot,
    requested_tier: Tier,
) -> PlannerDecision {
    plan_job_with_picker(
        preset,
        summary,
        capabilities,
        requested_tier,
        &DefaultEncoderPicker,
    )
}

pub fn plan_job_with_picker(
    preset: &Preset,
    summary: &ProbeSummary,
    capabilities: &CapabilitySnapshot,
    requested_tier: Tier,
    picker: &dyn EncoderPicker,
) -> PlannerDecision {
    let resolution = tier::resolve_tier(preset, requested_tier);
    let rule = container_rule(preset.container);

    let video_plan = video::plan_video(
        preset,
        summary,
        capabilities,
        preset.video.tiers.get(&resolution.tier),
        picker,
    );
    let audio_plan = audio::plan_audio(
        preset,
        summary,
        capabilities,
        preset.audio.tiers.get(&resolution.tier),
        picker,
    );
    let subtitle_plan = subtitle::plan_subtitles(preset.subtitles, summary, rule);

    let mut builder = ArgBuilder::new();
    builder.extend(video_plan.args.clone());
    builder.extend(audio_plan.args.clone());
    builder.extend(subtitle_plan.args.clone());
    builder.finish_container(preset.container, rule.requires_faststart);
    builder.extend(video_plan.filter_args.clone());

    let mut notes = Vec::new();
    if resolution.used_fallback {
        notes.push(format!(
            "Tier {} is not defined for this preset; using {}",
            requested_tier.as_str(),
            resolution.tier.as_str()
        ));
    }
    notes.extend(video_plan.notes);
    notes.extend(audio_plan.notes);
    notes.extend(subtitle_plan.notes);

    let mut warnings = Vec::new();
    warnings.extend(video_plan.warnings);
    warnings.extend(audio_plan.warnings);
    warnings.extend(subtitle_plan.warnings);

    // Remux means every stream action is a copy; a dropped or transcoded
    // stream disqualifies the decision.
    let actions = [video_plan.action, audio_plan.action, subtitle_plan.action];
    let remux_only = actions.iter().all(|a| *a == StreamAction::Copy);
    let exclusive = preset.video.codec.is_exclusive() && !remux_only;

    PlannerDecision {
        preset_id: preset.id.clone(),
        args: builder.into_args(),
        notes,
        warnings,
        remux_only,
        exclusive,
        tier: resolution.tier,
        tier_fallback: resolution.used_fallback,
    }
}
