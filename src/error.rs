use serde::{Deserialize, Serialize};

/// Canonical error codes surfaced on `failed` job states and through
/// rejected facade calls. The serde representation is the stable string
/// contract consumed by UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    JobInvalidArgs,
    JobMissingSource,
    JobConcurrencyLimit,
    JobExclusiveBlocked,
    JobOutputPermission,
    ProbeMissing,
    ProbeInvalid,
    ProbeProcessError,
    PresetUnavailable,
    RunnerSpawnFailed,
    RunnerInterrupted,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::JobInvalidArgs => "job_invalid_args",
            ErrorCode::JobMissingSource => "job_missing_source",
            ErrorCode::JobConcurrencyLimit => "job_concurrency_limit",
            ErrorCode::JobExclusiveBlocked => "job_exclusive_blocked",
            ErrorCode::JobOutputPermission => "job_output_permission",
            ErrorCode::ProbeMissing => "probe_missing",
            ErrorCode::ProbeInvalid => "probe_invalid",
            ErrorCode::ProbeProcessError => "probe_process_error",
            ErrorCode::PresetUnavailable => "preset_unavailable",
            ErrorCode::RunnerSpawnFailed => "runner_spawn_failed",
            ErrorCode::RunnerInterrupted => "runner_interrupted",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure surface of the probe adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe tool not found: {0}")]
    Missing(String),
    #[error("probe output invalid: {0}")]
    Invalid(String),
    #[error("probe process failed: {0}")]
    Process(String),
}

impl ProbeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProbeError::Missing(_) => ErrorCode::ProbeMissing,
            ProbeError::Invalid(_) => ErrorCode::ProbeInvalid,
            ProbeError::Process(_) => ErrorCode::ProbeProcessError,
        }
    }
}
