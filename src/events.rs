//! Publish-subscribe event bus with three topics: progress, stderr and
//! completion. Progress is coalesced per job to at most one event every
//! `PROGRESS_COALESCE_MS` so a saturated subscriber only costs intermediate
//! updates; completion events are always delivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::domain::{JobId, JobProgress};
use crate::error::ErrorCode;
use crate::sync_ext::MutexExt;

/// Deadline for coalescing intermediate progress events, per job.
pub const PROGRESS_COALESCE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Progress,
    Stderr,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        progress: JobProgress,
    },
    Stderr {
        job_id: JobId,
        line: String,
    },
    Completion {
        job_id: JobId,
        success: bool,
        cancelled: bool,
        exit_code: Option<i32>,
        code: Option<ErrorCode>,
        message: Option<String>,
    },
}

impl JobEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            JobEvent::Progress { .. } => EventTopic::Progress,
            JobEvent::Stderr { .. } => EventTopic::Stderr,
            JobEvent::Completion { .. } => EventTopic::Completion,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Stderr { job_id, .. }
            | JobEvent::Completion { job_id, .. } => *job_id,
        }
    }
}

pub type EventListener = Arc<dyn Fn(&JobEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(SubscriptionId, EventTopic, EventListener)>>,
    next_id: AtomicU64,
    last_progress_emit: Mutex<HashMap<JobId, Instant>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: EventTopic, listener: F) -> SubscriptionId
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock_unpoisoned()
            .push((id, topic, Arc::new(listener)));
        id
    }

    /// Remove a subscription. Listeners hold resources on the caller's
    /// side, so facade consumers must unsubscribe on teardown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock_unpoisoned();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Publish an intermediate progress event, coalescing to one per job
    /// per `PROGRESS_COALESCE_MS`. `force` bypasses the deadline for final
    /// updates (end-of-stream markers). Returns false when coalesced away.
    pub fn publish_progress(&self, job_id: JobId, progress: JobProgress, force: bool) -> bool {
        {
            let mut last = self.last_progress_emit.lock_unpoisoned();
            let now = Instant::now();
            if !force
                && let Some(previous) = last.get(&job_id)
                && now.duration_since(*previous).as_millis() < u128::from(PROGRESS_COALESCE_MS)
            {
                return false;
            }
            last.insert(job_id, now);
        }
        self.dispatch(&JobEvent::Progress { job_id, progress });
        true
    }

    pub fn publish_stderr(&self, job_id: JobId, line: String) {
        self.dispatch(&JobEvent::Stderr { job_id, line });
    }

    /// Completion is the reliable topic: never coalesced, never dropped.
    pub fn publish_completion(
        &self,
        job_id: JobId,
        success: bool,
        cancelled: bool,
        exit_code: Option<i32>,
        code: Option<ErrorCode>,
        message: Option<String>,
    ) {
        self.last_progress_emit.lock_unpoisoned().remove(&job_id);
        self.dispatch(&JobEvent::Completion {
            job_id,
            success,
            cancelled,
            exit_code,
            code,
            message,
        });
    }

    fn dispatch(&self, event: &JobEvent) {
        let listeners = self.listeners.lock_unpoisoned().clone();
        let topic = event.topic();
        for (_, listener_topic, listener) in &listeners {
            if *listener_topic == topic {
                listener(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn progress(seconds: f64) -> JobProgress {
        JobProgress {
            processed_seconds: seconds,
            ..JobProgress::default()
        }
    }

    #[test]
    fn subscribers_only_see_their_topic() {
        let bus = EventBus::new();
        let progress_hits = Arc::new(AtomicUsize::new(0));
        let completion_hits = Arc::new(AtomicUsize::new(0));

        {
            let hits = progress_hits.clone();
            bus.subscribe(EventTopic::Progress, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let hits = completion_hits.clone();
            bus.subscribe(EventTopic::Completion, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let job = JobId::new();
        bus.publish_progress(job, progress(1.0), true);
        bus.publish_completion(job, true, false, Some(0), None, None);

        assert_eq!(progress_hits.load(Ordering::SeqCst), 1);
        assert_eq!(completion_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn intermediate_progress_is_coalesced_within_the_deadline() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            bus.subscribe(EventTopic::Progress, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let job = JobId::new();
        assert!(bus.publish_progress(job, progress(1.0), false));
        // A burst well inside the 200 ms window collapses to the first event.
        for i in 0..20 {
            assert!(!bus.publish_progress(job, progress(1.0 + f64::from(i)), false));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(PROGRESS_COALESCE_MS + 20));
        assert!(bus.publish_progress(job, progress(30.0), false));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forced_progress_bypasses_coalescing() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            bus.subscribe(EventTopic::Progress, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let job = JobId::new();
        assert!(bus.publish_progress(job, progress(1.0), false));
        assert!(bus.publish_progress(job, progress(2.0), true));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn coalescing_is_tracked_per_job() {
        let bus = EventBus::new();
        let a = JobId::new();
        let b = JobId::new();
        assert!(bus.publish_progress(a, progress(1.0), false));
        assert!(bus.publish_progress(b, progress(1.0), false));
        assert!(!bus.publish_progress(a, progress(2.0), false));
    }

    #[test]
    fn completion_survives_a_saturated_progress_stream() {
        let bus = EventBus::new();
        let completions = Arc::new(AtomicUsize::new(0));
        {
            let completions = completions.clone();
            bus.subscribe(EventTopic::Completion, move |_| {
                completions.fetch_add(1, Ordering::SeqCst);
            });
        }

        let job = JobId::new();
        // Saturate the progress channel far past the coalescing window.
        for i in 0..500 {
            bus.publish_progress(job, progress(f64::from(i)), false);
        }
        bus.publish_completion(job, true, false, Some(0), None, None);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let hits = hits.clone();
            bus.subscribe(EventTopic::Stderr, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let job = JobId::new();
        bus.publish_stderr(job, "frame dropped".to_string());
        assert!(bus.unsubscribe(id));
        bus.publish_stderr(job, "another line".to_string());
        assert!(!bus.unsubscribe(id));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_carry_their_job_id_and_serialize_camel_case() {
        let job = JobId::new();
        let event = JobEvent::Completion {
            job_id: job,
            success: false,
            cancelled: false,
            exit_code: Some(1),
            code: None,
            message: Some("ffmpeg exited with non-zero status (exit code 1)".to_string()),
        };
        assert_eq!(event.job_id(), job);
        assert_eq!(event.topic(), EventTopic::Completion);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value.get("kind").unwrap(), "completion");
        assert!(value.get("exitCode").is_some());
        assert!(value.get("jobId").is_some());
    }
}
