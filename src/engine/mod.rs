//! Orchestrator facade: the single surface UI layers depend on. Calls
//! never block beyond short critical sections and are safe from any
//! thread; long-running work happens on the engine's worker threads.

mod progress;
mod runner;
mod scheduler;
mod state;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::capabilities::detect_capabilities;
use crate::domain::{BatchAdmission, CapabilitySnapshot, JobId, JobRecord, Preset, Tier};
use crate::error::ErrorCode;
use crate::events::{EventTopic, JobEvent, SubscriptionId};
use crate::settings::{Preferences, resolve_ffmpeg_path};
use crate::sync_ext::MutexExt;

use state::Inner;

/// The media conversion engine. Cloning is cheap and every clone drives
/// the same queue.
#[derive(Clone)]
pub struct ConversionEngine {
    pub(crate) inner: Arc<Inner>,
}

impl ConversionEngine {
    /// Create an engine and spawn its worker pool.
    pub fn new(prefs: Preferences) -> Self {
        let engine = Self {
            inner: Arc::new(Inner::new(prefs)),
        };
        worker::spawn_workers(&engine.inner);
        engine
    }

    /// Engine without worker threads, for tests that drive scheduling
    /// decisions deterministically under the lock.
    #[cfg(test)]
    pub(crate) fn new_for_tests(prefs: Preferences) -> Self {
        Self {
            inner: Arc::new(Inner::new(prefs)),
        }
    }

    /// Capability snapshot of the configured toolchain, probed once per
    /// engine and shared with the planner.
    pub fn load_capabilities(&self) -> Arc<CapabilitySnapshot> {
        let prefs = self.preferences();
        self.inner
            .capabilities
            .get_or_init(|| Arc::new(detect_capabilities(&resolve_ffmpeg_path(&prefs))))
            .clone()
    }

    pub fn list_presets(&self) -> &'static [Preset] {
        crate::catalog::list_presets()
    }

    /// Admit a job. `None` when the path duplicates a queued/active job or
    /// the preset id is unknown.
    pub fn enqueue(&self, path: &str, preset_id: &str, tier: Tier) -> Option<JobId> {
        scheduler::enqueue(&self.inner, path, preset_id, tier)
    }

    /// Admit a batch at the balanced tier, deduplicating within the batch.
    pub fn enqueue_many(&self, paths: &[String], preset_id: &str) -> BatchAdmission {
        scheduler::enqueue_many(&self.inner, paths, preset_id)
    }

    /// Start a specific queued job ahead of FIFO order. The concurrency
    /// and exclusivity constraints still apply; on rejection the job keeps
    /// its queue position and the blocking code is returned.
    pub fn start_job(&self, id: JobId) -> Result<(), ErrorCode> {
        scheduler::start_job(&self.inner, id)
    }

    /// Wake the workers to re-evaluate the queue head.
    pub fn start_next(&self) {
        scheduler::start_next(&self.inner);
    }

    /// Cancel a job. Queued jobs cancel synchronously; active jobs are
    /// terminated cooperatively and report through the completion event.
    pub fn cancel(&self, id: JobId) -> bool {
        scheduler::cancel(&self.inner, id)
    }

    /// Clamp and apply a new concurrency limit (n >= 1). Running jobs are
    /// not preempted.
    pub fn set_concurrency(&self, n: u32) {
        scheduler::set_concurrency(&self.inner, n);
    }

    /// Remove all terminal jobs from the in-memory history.
    pub fn clear_completed(&self) -> usize {
        scheduler::clear_completed(&self.inner)
    }

    pub fn subscribe<F>(&self, topic: EventTopic, handler: F) -> SubscriptionId
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Snapshot of every job record: waiting jobs in queue order first,
    /// then everything else by creation time.
    pub fn jobs_snapshot(&self) -> Vec<JobRecord> {
        let state = self.inner.state.lock_unpoisoned();
        let order: HashMap<JobId, usize> = state
            .queue
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();
        let mut jobs = state.repository.get_all();
        jobs.sort_by_key(|record| {
            (
                order.get(&record.id).copied().unwrap_or(usize::MAX),
                record.created_at,
                record.id,
            )
        });
        jobs
    }

    pub fn job_detail(&self, id: JobId) -> Option<JobRecord> {
        let state = self.inner.state.lock_unpoisoned();
        state.repository.get(id).cloned()
    }

    pub fn preferences(&self) -> Preferences {
        let state = self.inner.state.lock_unpoisoned();
        state.prefs.clone()
    }

    /// Current concurrency limit, after clamping.
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency.load(Ordering::Relaxed)
    }
}
