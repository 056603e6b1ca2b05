//! Admission, queueing and slot accounting. FIFO with strict head-of-line
//! blocking for exclusive jobs: an exclusive head waits for an idle engine
//! rather than letting later jobs overtake it.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::domain::{BatchAdmission, JobId, JobRecord, JobState, Preset, Stage, Tier, now_millis};
use crate::error::ErrorCode;
use crate::probe::normalize_source_path;
use crate::sync_ext::MutexExt;

use super::state::{EngineState, Inner};
use super::worker;

/// Admit a single job. Returns `None` when the path is empty, already
/// queued/active, or the preset id is unknown.
pub(crate) fn enqueue(inner: &Arc<Inner>, path: &str, preset_id: &str, tier: Tier) -> Option<JobId> {
    let Some(preset) = crate::catalog::resolve_preset(preset_id) else {
        tracing::warn!(preset_id, code = %ErrorCode::PresetUnavailable, "enqueue rejected");
        return None;
    };

    let id = {
        let mut state = inner.state.lock_unpoisoned();
        admit_locked(&mut state, path, preset, tier)?
    };
    inner.cv.notify_one();
    Some(id)
}

/// Admit a batch under a single lock acquisition, deduplicating within the
/// batch itself. Every input path lands in exactly one of the two buckets.
pub(crate) fn enqueue_many(
    inner: &Arc<Inner>,
    paths: &[String],
    preset_id: &str,
) -> BatchAdmission {
    let mut admission = BatchAdmission::default();

    let Some(preset) = crate::catalog::resolve_preset(preset_id) else {
        tracing::warn!(preset_id, code = %ErrorCode::PresetUnavailable, "batch enqueue rejected");
        admission.duplicates = paths.to_vec();
        return admission;
    };

    {
        let mut state = inner.state.lock_unpoisoned();
        let mut seen_in_batch = std::collections::HashSet::new();
        for path in paths {
            let normalized = normalize_source_path(path);
            if !seen_in_batch.insert(normalized.clone()) {
                tracing::debug!(path = %path, "duplicate within batch; skipped");
                admission.duplicates.push(path.clone());
                continue;
            }
            match admit_locked(&mut state, path, preset, Tier::Balanced) {
                Some(id) => admission.accepted.push(id),
                None => {
                    tracing::debug!(path = %path, "duplicate of an existing job; skipped");
                    admission.duplicates.push(path.clone());
                }
            }
        }
    }

    if !admission.accepted.is_empty() {
        inner.cv.notify_all();
    }
    admission
}

fn admit_locked(
    state: &mut EngineState,
    path: &str,
    preset: &Preset,
    tier: Tier,
) -> Option<JobId> {
    let normalized = normalize_source_path(path);
    if normalized.is_empty() {
        return None;
    }

    if let Some(existing) = state.repository.get_by_path(&normalized) {
        if !existing.state.is_terminal() {
            return None;
        }
        // A terminal record for the same path is replaced by the new job.
        let stale_id = existing.id;
        state.repository.delete(stale_id);
    }

    // Conservative exclusivity: refined from the planner decision later,
    // which can only clear the flag (copy reuse), never set it.
    let exclusive = preset.video.codec.is_exclusive() && !preset.remux_only;

    let id = JobId::new();
    let mut record = JobRecord::new(id, normalized, preset.id.clone(), tier, exclusive);
    if !preset.source_containers.is_empty() {
        let ext = std::path::Path::new(&record.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let accepted = ext.as_deref().is_some_and(|ext| {
            preset
                .source_containers
                .iter()
                .any(|container| container.extension() == ext)
        });
        if !accepted {
            record.push_log(format!(
                "Source container is outside this preset's accepted inputs ({})",
                preset
                    .source_containers
                    .iter()
                    .map(|c| c.extension())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
    }
    state.repository.save(record);
    state.queue.push_back(id);
    Some(id)
}

/// Pop the next startable job and claim it (queued -> probing) under the
/// engine lock. Strict head-of-line: when the head cannot start, nothing
/// behind it may overtake.
pub(crate) fn next_job_for_worker_locked(
    state: &mut EngineState,
    max_concurrency: usize,
) -> Option<JobId> {
    // Drop stale queue entries (deleted or already-terminal records).
    while let Some(head) = state.queue.front() {
        match state.repository.get(*head) {
            Some(record) if record.stage() == Stage::Queued => break,
            _ => {
                state.queue.pop_front();
            }
        }
    }

    let head = *state.queue.front()?;
    let record = state.repository.get(head)?;

    if state.active_jobs.len() >= max_concurrency {
        return None;
    }
    if record.exclusive {
        if !state.active_jobs.is_empty() {
            return None;
        }
    } else if state.any_active_exclusive() {
        return None;
    }

    state.queue.pop_front();
    let enqueued_at = state.repository.get(head)?.state.enqueued_at();
    state.repository.transition(
        head,
        JobState::Probing {
            enqueued_at,
            started_at: now_millis(),
        },
    );
    state.active_jobs.insert(head);
    Some(head)
}

/// Explicit out-of-order start. The slot rule still applies; on success
/// the job moves to the queue head so the next free worker takes it, on
/// rejection it keeps its queue position and the blocking code is
/// returned.
pub(crate) fn start_job(inner: &Arc<Inner>, id: JobId) -> Result<(), ErrorCode> {
    let result = {
        let mut state = inner.state.lock_unpoisoned();
        let Some(record) = state.repository.get(id) else {
            return Err(ErrorCode::JobInvalidArgs);
        };
        if record.stage() != Stage::Queued {
            return Err(ErrorCode::JobInvalidArgs);
        }
        let exclusive = record.exclusive;

        let max = inner.max_concurrency.load(Ordering::Relaxed);
        if state.active_jobs.len() >= max {
            Err(ErrorCode::JobConcurrencyLimit)
        } else if (exclusive && !state.active_jobs.is_empty()) || state.any_active_exclusive() {
            Err(ErrorCode::JobExclusiveBlocked)
        } else {
            if let Some(pos) = state.queue.iter().position(|queued| *queued == id) {
                let _ = state.queue.remove(pos);
            }
            state.queue.push_front(id);
            Ok(())
        }
    };

    if result.is_ok() {
        inner.cv.notify_one();
    }
    result
}

/// Wake workers so they re-evaluate the queue head.
pub(crate) fn start_next(inner: &Arc<Inner>) {
    inner.cv.notify_all();
}

/// Cancel a job. Queued jobs transition synchronously; active jobs are
/// flagged for cooperative cancellation and reach their terminal state
/// through the runner's completion path. Idempotent: repeated calls on an
/// already-cancelling job coalesce.
pub(crate) fn cancel(inner: &Arc<Inner>, id: JobId) -> bool {
    enum Outcome {
        NotFound,
        AlreadyTerminal,
        CancelledSynchronously,
        FlaggedActive,
    }

    let outcome = {
        let mut state = inner.state.lock_unpoisoned();
        match state.repository.get(id) {
            None => Outcome::NotFound,
            Some(record) if record.state.is_terminal() => Outcome::AlreadyTerminal,
            Some(record) if record.stage() == Stage::Queued => {
                let enqueued_at = record.state.enqueued_at();
                state.queue.retain(|queued| *queued != id);
                let applied = state.repository.transition(
                    id,
                    JobState::Cancelled {
                        enqueued_at,
                        started_at: None,
                        finished_at: now_millis(),
                    },
                );
                debug_assert!(applied);
                state
                    .repository
                    .update(id, |record| record.push_log("Cancelled before start"));
                state.repository.prune_terminal();
                Outcome::CancelledSynchronously
            }
            Some(_) => {
                state.cancel_requests.insert(id);
                Outcome::FlaggedActive
            }
        }
    };

    match outcome {
        Outcome::NotFound | Outcome::AlreadyTerminal => false,
        Outcome::CancelledSynchronously => {
            inner
                .bus
                .publish_completion(id, false, true, None, None, None);
            inner.cv.notify_all();
            true
        }
        Outcome::FlaggedActive => {
            // Reach into the process table so a running encode sees the
            // cancel without waiting for the next poll tick.
            worker::signal_process_cancel(inner, id);
            true
        }
    }
}

/// Drop every terminal job from the repository. Returns how many were
/// removed.
pub(crate) fn clear_completed(inner: &Arc<Inner>) -> usize {
    let mut state = inner.state.lock_unpoisoned();
    let terminal: Vec<JobId> = Stage::TERMINAL
        .iter()
        .flat_map(|stage| state.repository.ids_in_stage(*stage))
        .collect();
    let mut removed = 0;
    for id in terminal {
        if state.repository.delete(id).is_some() {
            removed += 1;
        }
    }
    removed
}

/// Clamp and apply a new concurrency limit, then extend the worker pool
/// and wake everyone so freed slots fill immediately. Running jobs are
/// never preempted.
pub(crate) fn set_concurrency(inner: &Arc<Inner>, n: u32) {
    let clamped = (n as usize).max(1);
    inner.max_concurrency.store(clamped, Ordering::Relaxed);
    {
        let mut state = inner.state.lock_unpoisoned();
        state.prefs.max_concurrency = clamped as u32;
    }
    worker::spawn_workers(inner);
    inner.cv.notify_all();
}
