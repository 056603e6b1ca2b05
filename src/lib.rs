//! Media conversion orchestration core.
//!
//! Drives an external FFmpeg-family toolchain through three subsystems:
//! a pure [`planner`] that turns a probed source plus a declarative preset
//! into a deterministic encoder command, a scheduler that admits jobs and
//! enforces the concurrency and exclusive-codec rules, and a runner that
//! spawns and supervises the encoder processes. UI layers consume the
//! whole thing through [`ConversionEngine`].

pub mod capabilities;
pub mod catalog;
pub mod domain;
mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod output_path;
pub mod planner;
pub mod probe;
pub mod repository;
pub mod settings;
mod sync_ext;

pub use capabilities::load_capabilities;
pub use domain::{
    ACodec, BatchAdmission, CapabilitySnapshot, Container, JobId, JobProgress, JobRecord,
    JobState, MediaKind, PlannerDecision, Preset, ProbeSummary, Stage, SubtitleMode, Tier, VCodec,
};
pub use engine::ConversionEngine;
pub use error::{ErrorCode, ProbeError};
pub use events::{EventTopic, JobEvent, SubscriptionId};
pub use planner::plan_job;
pub use settings::Preferences;
