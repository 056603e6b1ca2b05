//! In-memory job store with secondary indexes by source path (duplicate
//! detection) and stage (status queries). The repository is the only
//! shared mutable structure in the engine; the engine lock serializes all
//! access.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{JobId, JobRecord, JobState, Stage, now_millis};
use crate::lifecycle::ensure_transition;

/// Terminal jobs kept after pruning; oldest by `updatedAt` are evicted.
pub const TERMINAL_JOB_CAP: usize = 200;

#[derive(Debug, Default)]
pub struct JobRepository {
    jobs: HashMap<JobId, JobRecord>,
    by_path: HashMap<String, JobId>,
    by_stage: HashMap<Stage, BTreeSet<JobId>>,
}

impl JobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.jobs.get(&id)
    }

    pub fn get_all(&self) -> Vec<JobRecord> {
        self.jobs.values().cloned().collect()
    }

    pub fn get_by_stages(&self, stages: &[Stage]) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = stages
            .iter()
            .filter_map(|stage| self.by_stage.get(stage))
            .flatten()
            .filter_map(|id| self.jobs.get(id))
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.created_at, record.id));
        records
    }

    pub fn get_by_path(&self, path: &str) -> Option<&JobRecord> {
        self.by_path.get(path).and_then(|id| self.jobs.get(id))
    }

    pub fn exists(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.jobs.len()
    }

    pub fn count_stage(&self, stage: Stage) -> usize {
        self.by_stage.get(&stage).map_or(0, BTreeSet::len)
    }

    pub fn ids_in_stage(&self, stage: Stage) -> Vec<JobId> {
        self.by_stage
            .get(&stage)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Insert or replace a record, refreshing `updatedAt` and both indexes.
    pub fn save(&mut self, mut record: JobRecord) {
        record.updated_at = now_millis();
        if let Some(previous) = self.jobs.get(&record.id) {
            let prev_id = previous.id;
            let prev_path = previous.path.clone();
            let prev_stage = previous.stage();
            self.unindex(prev_id, &prev_path, prev_stage);
        }
        self.index(record.id, &record.path, record.stage());
        self.jobs.insert(record.id, record);
    }

    /// Mutate a record in place. Returns false for unknown ids.
    pub fn update(&mut self, id: JobId, mutator: impl FnOnce(&mut JobRecord)) -> bool {
        let Some(record) = self.jobs.get_mut(&id) else {
            return false;
        };
        let old_stage = record.stage();
        let old_path = record.path.clone();
        mutator(record);
        record.updated_at = now_millis();
        let new_stage = record.stage();
        let new_path = record.path.clone();
        if old_stage != new_stage || old_path != new_path {
            self.unindex(id, &old_path, old_stage);
            self.index(id, &new_path, new_stage);
        }
        true
    }

    /// Apply a lifecycle-checked state transition. Illegal transitions are
    /// refused (and abort in debug builds via the shared guard).
    pub fn transition(&mut self, id: JobId, next: JobState) -> bool {
        let Some(record) = self.jobs.get(&id) else {
            return false;
        };
        if !ensure_transition(record.stage(), next.stage()) {
            return false;
        }
        self.update(id, |record| {
            record.state = next;
        })
    }

    pub fn delete(&mut self, id: JobId) -> Option<JobRecord> {
        let record = self.jobs.remove(&id)?;
        self.unindex(id, &record.path, record.stage());
        Some(record)
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.by_path.clear();
        self.by_stage.clear();
    }

    /// Evict the oldest terminal records beyond `TERMINAL_JOB_CAP`.
    /// Runs after every terminal transition.
    pub fn prune_terminal(&mut self) -> usize {
        let mut terminal: Vec<(u64, JobId)> = Stage::TERMINAL
            .iter()
            .filter_map(|stage| self.by_stage.get(stage))
            .flatten()
            .filter_map(|id| self.jobs.get(id).map(|record| (record.updated_at, *id)))
            .collect();
        if terminal.len() <= TERMINAL_JOB_CAP {
            return 0;
        }
        terminal.sort_unstable();
        let excess = terminal.len() - TERMINAL_JOB_CAP;
        let mut pruned = 0;
        for (_, id) in terminal.into_iter().take(excess) {
            if self.delete(id).is_some() {
                pruned += 1;
            }
        }
        pruned
    }

    fn index(&mut self, id: JobId, path: &str, stage: Stage) {
        self.by_path.insert(path.to_string(), id);
        self.by_stage.entry(stage).or_default().insert(id);
    }

    fn unindex(&mut self, id: JobId, path: &str, stage: Stage) {
        if self.by_path.get(path) == Some(&id) {
            self.by_path.remove(path);
        }
        if let Some(ids) = self.by_stage.get_mut(&stage) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_stage.remove(&stage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;

    fn record(path: &str) -> JobRecord {
        JobRecord::new(
            JobId::new(),
            path.to_string(),
            "mp4-h264".to_string(),
            Tier::Balanced,
            false,
        )
    }

    fn terminal_record(path: &str, finished_at: u64) -> JobRecord {
        let mut r = record(path);
        r.state = JobState::Completed {
            enqueued_at: 1,
            started_at: 2,
            finished_at,
            output_path: format!("{path}.out.mp4"),
        };
        r
    }

    #[test]
    fn save_indexes_by_path_and_stage() {
        let mut repo = JobRepository::new();
        let r = record("/videos/a.mp4");
        let id = r.id;
        repo.save(r);

        assert!(repo.exists(id));
        assert_eq!(repo.count(), 1);
        assert_eq!(repo.count_stage(Stage::Queued), 1);
        assert_eq!(repo.get_by_path("/videos/a.mp4").map(|r| r.id), Some(id));
        assert!(repo.get_by_path("/videos/other.mp4").is_none());
    }

    #[test]
    fn transition_moves_the_record_between_stage_indexes() {
        let mut repo = JobRepository::new();
        let r = record("/videos/a.mp4");
        let id = r.id;
        let enqueued_at = r.state.enqueued_at();
        repo.save(r);

        assert!(repo.transition(
            id,
            JobState::Probing {
                enqueued_at,
                started_at: now_millis(),
            },
        ));
        assert_eq!(repo.count_stage(Stage::Queued), 0);
        assert_eq!(repo.count_stage(Stage::Probing), 1);
        assert_eq!(repo.get(id).map(|r| r.stage()), Some(Stage::Probing));
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut repo = JobRepository::new();
        let r = record("/videos/a.mp4");
        let id = r.id;
        let enqueued_at = r.state.enqueued_at();
        repo.save(r);

        let illegal = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            repo.transition(
                id,
                JobState::Completed {
                    enqueued_at,
                    started_at: 0,
                    finished_at: 1,
                    output_path: "/out.mp4".to_string(),
                },
            )
        }));
        // Debug builds abort inside the guard; release builds refuse.
        match illegal {
            Ok(applied) => assert!(!applied),
            Err(_) => {}
        }
        assert_eq!(repo.get(id).map(|r| r.stage()), Some(Stage::Queued));
    }

    #[test]
    fn update_refreshes_updated_at() {
        let mut repo = JobRepository::new();
        let r = record("/videos/a.mp4");
        let id = r.id;
        repo.save(r);
        let before = repo.get(id).unwrap().updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(repo.update(id, |record| record.push_log("probing source")));
        let after = repo.get(id).unwrap().updated_at;
        assert!(after >= before);
        assert_eq!(repo.get(id).unwrap().logs.len(), 1);
    }

    #[test]
    fn delete_removes_all_index_entries() {
        let mut repo = JobRepository::new();
        let r = record("/videos/a.mp4");
        let id = r.id;
        repo.save(r);

        assert!(repo.delete(id).is_some());
        assert!(!repo.exists(id));
        assert!(repo.get_by_path("/videos/a.mp4").is_none());
        assert_eq!(repo.count_stage(Stage::Queued), 0);
        assert!(repo.delete(id).is_none());
    }

    #[test]
    fn prune_terminal_evicts_oldest_by_updated_at() {
        let mut repo = JobRepository::new();
        let mut ids = Vec::new();
        for i in 0..(TERMINAL_JOB_CAP + 25) {
            let r = terminal_record(&format!("/videos/{i}.mp4"), i as u64);
            ids.push(r.id);
            repo.save(r);
        }
        // Force distinct, ordered updatedAt values.
        for (i, id) in ids.iter().enumerate() {
            if let Some(record) = repo.jobs.get_mut(id) {
                record.updated_at = i as u64;
            }
        }

        let pruned = repo.prune_terminal();
        assert_eq!(pruned, 25);
        assert_eq!(repo.count(), TERMINAL_JOB_CAP);
        // The oldest 25 are gone, the newest survive.
        for id in &ids[..25] {
            assert!(!repo.exists(*id));
        }
        for id in &ids[25..] {
            assert!(repo.exists(*id));
        }
    }

    #[test]
    fn prune_terminal_ignores_active_jobs() {
        let mut repo = JobRepository::new();
        for i in 0..(TERMINAL_JOB_CAP + 10) {
            repo.save(terminal_record(&format!("/videos/t{i}.mp4"), i as u64));
        }
        for i in 0..5 {
            repo.save(record(&format!("/videos/q{i}.mp4")));
        }

        repo.prune_terminal();
        assert_eq!(repo.count_stage(Stage::Queued), 5);
        let terminal_count: usize = Stage::TERMINAL
            .iter()
            .map(|stage| repo.count_stage(*stage))
            .sum();
        assert_eq!(terminal_count, TERMINAL_JOB_CAP);
    }
}
