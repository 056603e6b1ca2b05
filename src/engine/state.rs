//! Shared engine state. All mutation funnels through `Inner.state` under a
//! single mutex; worker threads block on the condvar until the queue has
//! an eligible job. Process handles live in a separate runner-owned table
//! so cancellation can reach a child without the engine lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::{Arc, Condvar, Mutex};

use once_cell::sync::OnceCell;

use crate::domain::{CapabilitySnapshot, JobId};
use crate::events::EventBus;
use crate::repository::JobRepository;
use crate::settings::Preferences;

/// Live child process bookkeeping, keyed by job id. The supervising
/// worker thread owns the `Child` itself; this entry only carries what
/// cancellation needs.
pub(crate) struct ProcessHandle {
    pub pid: u32,
    pub cancel: Arc<AtomicBool>,
    pub exclusive: bool,
}

pub(crate) struct EngineState {
    pub repository: JobRepository,
    /// Waiting jobs in FIFO admission order.
    pub queue: VecDeque<JobId>,
    /// Jobs claimed by a worker (probing, planning or running).
    pub active_jobs: HashSet<JobId>,
    /// Cooperative cancellation requests, observed by workers and the
    /// runner's poll loop.
    pub cancel_requests: HashSet<JobId>,
    pub spawned_workers: usize,
    pub prefs: Preferences,
}

impl EngineState {
    pub(crate) fn new(prefs: Preferences) -> Self {
        Self {
            repository: JobRepository::new(),
            queue: VecDeque::new(),
            active_jobs: HashSet::new(),
            cancel_requests: HashSet::new(),
            spawned_workers: 0,
            prefs,
        }
    }

    /// True when any claimed job is flagged exclusive.
    pub(crate) fn any_active_exclusive(&self) -> bool {
        self.active_jobs
            .iter()
            .filter_map(|id| self.repository.get(*id))
            .any(|record| record.exclusive)
    }
}

pub(crate) struct Inner {
    pub state: Mutex<EngineState>,
    pub cv: Condvar,
    pub max_concurrency: AtomicUsize,
    pub bus: EventBus,
    pub processes: Mutex<HashMap<JobId, ProcessHandle>>,
    pub capabilities: OnceCell<Arc<CapabilitySnapshot>>,
}

impl Inner {
    pub(crate) fn new(prefs: Preferences) -> Self {
        let max_concurrency = prefs.effective_max_concurrency();
        Self {
            state: Mutex::new(EngineState::new(prefs)),
            cv: Condvar::new(),
            max_concurrency: AtomicUsize::new(max_concurrency),
            bus: EventBus::new(),
            processes: Mutex::new(HashMap::new()),
            capabilities: OnceCell::new(),
        }
    }
}
