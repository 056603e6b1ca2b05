//! Worker threads: wait for startable jobs, then drive each one through
//! probing -> planning -> running. Panics inside a job never take the
//! worker down; they surface as a failed terminal state.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use crate::capabilities::detect_capabilities;
use crate::catalog::resolve_preset;
use crate::domain::{JobId, JobProgress, JobState, now_millis};
use crate::error::ErrorCode;
use crate::output_path::compose_output_path;
use crate::planner::{assemble_invocation, format_command_for_log, plan_job};
use crate::probe::probe;
use crate::settings::{resolve_ffmpeg_path, resolve_ffprobe_path};
use crate::sync_ext::{CondvarExt, MutexExt};

use super::runner;
use super::scheduler::next_job_for_worker_locked;
use super::state::Inner;

/// Extend the worker pool up to the current concurrency limit. Threads
/// beyond the limit simply block on the condvar; the pool never shrinks.
pub(crate) fn spawn_workers(inner: &Arc<Inner>) {
    #[cfg(test)]
    {
        if std::env::var_os("FFPRESS_ENABLE_WORKERS_IN_TESTS").is_none() {
            return;
        }
    }

    let desired = inner.max_concurrency.load(Ordering::Relaxed).max(1);
    let start_index = {
        let state = inner.state.lock_unpoisoned();
        state.spawned_workers
    };

    let mut spawned = 0usize;
    for index in start_index..desired {
        let inner_clone = inner.clone();
        let result = thread::Builder::new()
            .name(format!("ffpress-worker-{index}"))
            .spawn(move || worker_loop(&inner_clone));
        if let Err(err) = result {
            tracing::error!(index, error = %err, "failed to spawn worker thread");
            break;
        }
        spawned += 1;
    }

    if spawned > 0 {
        let mut state = inner.state.lock_unpoisoned();
        state.spawned_workers = state.spawned_workers.max(start_index + spawned);
    }
}

fn worker_loop(inner: &Arc<Inner>) {
    loop {
        let job_id = {
            let mut state = inner.state.lock_unpoisoned();
            loop {
                let max = inner.max_concurrency.load(Ordering::Relaxed);
                if let Some(id) = next_job_for_worker_locked(&mut state, max) {
                    break id;
                }
                state = inner.cv.wait_unpoisoned(state);
            }
        };

        let result = guarded_job(|| process_job(inner, job_id));
        if let Err(reason) = result {
            finish_failed(
                inner,
                job_id,
                Some(ErrorCode::RunnerInterrupted),
                reason,
                None,
            );
        }

        {
            let mut state = inner.state.lock_unpoisoned();
            state.active_jobs.remove(&job_id);
            state.cancel_requests.remove(&job_id);
        }
        // A freed slot may unblock the queue head (or an exclusive job
        // waiting for an idle engine).
        inner.cv.notify_all();
    }
}

fn guarded_job<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> anyhow::Result<()> + std::panic::UnwindSafe,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("Conversion failed: {err:#}")),
        Err(payload) => Err(format!(
            "Conversion panicked: {}",
            panic_payload_to_string(&*payload)
        )),
    }
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}

/// Drive one claimed job (already in `probing`) to a terminal state.
fn process_job(inner: &Arc<Inner>, job_id: JobId) -> anyhow::Result<()> {
    let (path, preset_id, tier, prefs) = {
        let state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return Ok(());
        };
        (
            record.path.clone(),
            record.preset_id.clone(),
            record.tier,
            state.prefs.clone(),
        )
    };

    if is_cancel_requested(inner, job_id) {
        finish_cancelled(inner, job_id, None);
        return Ok(());
    }

    let Some(preset) = resolve_preset(&preset_id) else {
        finish_failed(
            inner,
            job_id,
            Some(ErrorCode::PresetUnavailable),
            format!("Preset {preset_id} is unknown"),
            None,
        );
        return Ok(());
    };

    // Probing.
    let summary = match probe(&resolve_ffprobe_path(&prefs), &path) {
        Ok(summary) => summary,
        Err(err) => {
            finish_failed(inner, job_id, Some(err.code()), format!("{err}"), None);
            return Ok(());
        }
    };

    if is_cancel_requested(inner, job_id) {
        finish_cancelled(inner, job_id, None);
        return Ok(());
    }

    // Planning. The capability snapshot is detected once per engine and
    // shared by every job.
    let capabilities = inner
        .capabilities
        .get_or_init(|| Arc::new(detect_capabilities(&resolve_ffmpeg_path(&prefs))))
        .clone();

    {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return Ok(());
        };
        let enqueued_at = record.state.enqueued_at();
        let started_at = record.state.started_at().unwrap_or_else(now_millis);
        if !state.repository.transition(
            job_id,
            JobState::Planning {
                enqueued_at,
                started_at,
                summary: summary.clone(),
            },
        ) {
            return Ok(());
        }
        state.repository.update(job_id, |record| {
            record.summary = Some(summary.clone());
        });
    }

    let decision = plan_job(preset, &summary, &capabilities, tier);
    let output_path = compose_output_path(&path, preset, decision.tier, &prefs);
    let invocation = assemble_invocation(&decision.args, &path, &output_path);
    let command_line = format_command_for_log("ffmpeg", &invocation);

    {
        let mut state = inner.state.lock_unpoisoned();
        state.repository.update(job_id, |record| {
            // Exclusivity was set conservatively from the preset; the
            // decision can only clear it (copy reuse of an expensive
            // codec), never introduce it.
            record.exclusive = decision.exclusive;
            record.output_path = Some(output_path.to_string_lossy().into_owned());
            record.command_line = Some(command_line.clone());
            for note in &decision.notes {
                record.push_log(note.clone());
            }
            for warning in &decision.warnings {
                record.push_log(format!("warning: {warning}"));
            }
            record.decision = Some(decision.clone());
        });
    }

    if is_cancel_requested(inner, job_id) {
        finish_cancelled(inner, job_id, None);
        return Ok(());
    }

    // Running.
    {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return Ok(());
        };
        let enqueued_at = record.state.enqueued_at();
        let started_at = record.state.started_at().unwrap_or_else(now_millis);
        if !state.repository.transition(
            job_id,
            JobState::Running {
                enqueued_at,
                started_at,
                progress: JobProgress::default(),
            },
        ) {
            return Ok(());
        }
    }

    runner::execute(inner, job_id, &path, &decision, &output_path, &prefs)
}

pub(crate) fn is_cancel_requested(inner: &Arc<Inner>, job_id: JobId) -> bool {
    let state = inner.state.lock_unpoisoned();
    state.cancel_requests.contains(&job_id)
}

/// Flip the cancel flag on a live process handle so the supervising loop
/// reacts on its next tick. No-op when the job has no spawned process yet.
pub(crate) fn signal_process_cancel(inner: &Arc<Inner>, job_id: JobId) -> bool {
    let processes = inner.processes.lock_unpoisoned();
    match processes.get(&job_id) {
        Some(handle) => {
            tracing::debug!(job = %job_id, pid = handle.pid, "cancel flag set on live process");
            handle.cancel.store(true, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

/// Move a job into `failed`, append the reason to its log, prune terminal
/// history and emit the reliable completion event. Safe to call more than
/// once; only the first terminal transition publishes.
pub(crate) fn finish_failed(
    inner: &Arc<Inner>,
    job_id: JobId,
    code: Option<ErrorCode>,
    message: String,
    exit_code: Option<i32>,
) {
    let applied = {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return;
        };
        if record.state.is_terminal() {
            false
        } else {
            let enqueued_at = record.state.enqueued_at();
            let started_at = record.state.started_at();
            state.repository.update(job_id, |record| {
                record.push_log(message.clone());
            });
            let applied = state.repository.transition(
                job_id,
                JobState::Failed {
                    enqueued_at,
                    started_at,
                    finished_at: now_millis(),
                    error: message.clone(),
                    code,
                },
            );
            state.repository.prune_terminal();
            applied
        }
    };
    if applied {
        tracing::warn!(job = %job_id, ?code, message = %message, "job failed");
        inner
            .bus
            .publish_completion(job_id, false, false, exit_code, code, Some(message));
    }
}

/// Move a job into `cancelled` and emit its single completion event.
pub(crate) fn finish_cancelled(inner: &Arc<Inner>, job_id: JobId, exit_code: Option<i32>) {
    let applied = {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return;
        };
        if record.state.is_terminal() {
            false
        } else {
            let enqueued_at = record.state.enqueued_at();
            let started_at = record.state.started_at();
            state.repository.update(job_id, |record| {
                record.push_log("Cancelled");
            });
            let applied = state.repository.transition(
                job_id,
                JobState::Cancelled {
                    enqueued_at,
                    started_at,
                    finished_at: now_millis(),
                },
            );
            state.repository.prune_terminal();
            applied
        }
    };
    if applied {
        inner
            .bus
            .publish_completion(job_id, false, true, exit_code, None, None);
    }
}

/// Move a job into `completed` and emit the success completion event.
pub(crate) fn finish_completed(inner: &Arc<Inner>, job_id: JobId, output_path: &Path) {
    let applied = {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(job_id) else {
            return;
        };
        if record.state.is_terminal() {
            false
        } else {
            let enqueued_at = record.state.enqueued_at();
            let started_at = record.state.started_at().unwrap_or_else(now_millis);
            let applied = state.repository.transition(
                job_id,
                JobState::Completed {
                    enqueued_at,
                    started_at,
                    finished_at: now_millis(),
                    output_path: output_path.to_string_lossy().into_owned(),
                },
            );
            state.repository.prune_terminal();
            applied
        }
    };
    if applied {
        inner
            .bus
            .publish_completion(job_id, true, false, Some(0), None, None);
    }
}
