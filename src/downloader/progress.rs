// Job registry - shared progress state for in-flight downloads
//
// One entry per active job, written by the download's event consumer and
// read by independent polling requests. A single mutex guards the whole
// map so a reader always sees a fully-applied update. Entries live exactly
// as long as their job: created when the download starts, removed on
// success or failure before the caller-facing response is finalized.

use std::collections::HashMap;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::debug;

use super::models::{JobState, ProgressSnapshot};

#[derive(Debug, Clone)]
struct JobEntry {
    percent: f64,
    state: JobState,
    size: Option<String>,
    speed: Option<String>,
    created_at: OffsetDateTime,
}

impl JobEntry {
    fn new() -> Self {
        Self {
            percent: 0.0,
            state: JobState::Starting,
            size: None,
            speed: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let default = ProgressSnapshot::default();
        ProgressSnapshot {
            percent: self.percent,
            state: self.state.as_str().to_string(),
            size: self.size.clone().unwrap_or(default.size),
            speed: self.speed.clone().unwrap_or(default.speed),
        }
    }
}

/// Partial update merged into an existing entry. Unset fields keep their
/// previous value.
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    pub percent: Option<f64>,
    pub state: Option<JobState>,
    pub size: Option<String>,
    pub speed: Option<String>,
}

/// Lock-guarded map of job progress, keyed by job id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh job in the Starting state, replacing any prior
    /// entry under the same id.
    pub fn create(&self, job_id: &str) {
        self.jobs.lock().insert(job_id.to_string(), JobEntry::new());
    }

    /// Merge a patch into the job's entry, creating one when the job is
    /// unknown. While a job is downloading its percentage only
    /// moves forward; the provider restarts its counter for each stream of
    /// a multi-stream transfer and those resets must not be visible.
    pub fn update(&self, job_id: &str, patch: ProgressPatch) {
        let mut jobs = self.jobs.lock();
        let entry = jobs
            .entry(job_id.to_string())
            .or_insert_with(JobEntry::new);

        let was_downloading = entry.state == JobState::Downloading;
        if let Some(state) = patch.state {
            entry.state = state;
        }
        if let Some(percent) = patch.percent {
            let clamped = percent.clamp(0.0, 100.0);
            if was_downloading && entry.state == JobState::Downloading {
                entry.percent = entry.percent.max(clamped);
            } else {
                entry.percent = clamped;
            }
        }
        if let Some(size) = patch.size {
            entry.size = Some(size);
        }
        if let Some(speed) = patch.speed {
            entry.speed = Some(speed);
        }
    }

    /// Point-in-time snapshot for a job; unknown ids get the default
    /// "not started" snapshot instead of an error.
    pub fn get(&self, job_id: &str) -> ProgressSnapshot {
        self.jobs
            .lock()
            .get(job_id)
            .map(JobEntry::snapshot)
            .unwrap_or_default()
    }

    /// Drop a job's entry. Safe to call for ids that were never registered
    /// or were already removed.
    pub fn remove(&self, job_id: &str) {
        if let Some(entry) = self.jobs.lock().remove(job_id) {
            let tracked_for = OffsetDateTime::now_utc() - entry.created_at;
            debug!(job_id, ?tracked_for, "job removed from registry");
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn downloading_patch(percent: f64, size: &str, speed: &str) -> ProgressPatch {
        ProgressPatch {
            percent: Some(percent),
            state: Some(JobState::Downloading),
            size: Some(size.to_string()),
            speed: Some(speed.to_string()),
        }
    }

    #[test]
    fn test_unknown_job_gets_default_snapshot() {
        let registry = JobRegistry::new();
        let snapshot = registry.get("missing");
        assert_eq!(snapshot, ProgressSnapshot::default());
        assert_eq!(snapshot.state, "Not started");
    }

    #[test]
    fn test_create_then_update_then_remove() {
        let registry = JobRegistry::new();
        registry.create("job-1");
        assert_eq!(registry.get("job-1").state, "Starting...");

        registry.update("job-1", downloading_patch(42.5, "10 MB / 24 MB", "1.2 MB/s"));
        let snapshot = registry.get("job-1");
        assert_eq!(snapshot.percent, 42.5);
        assert_eq!(snapshot.state, "Downloading...");
        assert_eq!(snapshot.size, "10 MB / 24 MB");
        assert_eq!(snapshot.speed, "1.2 MB/s");

        registry.remove("job-1");
        assert_eq!(registry.get("job-1"), ProgressSnapshot::default());
        // idempotent
        registry.remove("job-1");
    }

    #[test]
    fn test_create_overwrites_prior_entry() {
        let registry = JobRegistry::new();
        registry.create("job-1");
        registry.update("job-1", downloading_patch(80.0, "x", "y"));
        registry.create("job-1");
        let snapshot = registry.get("job-1");
        assert_eq!(snapshot.percent, 0.0);
        assert_eq!(snapshot.state, "Starting...");
    }

    #[test]
    fn test_update_creates_missing_entry() {
        let registry = JobRegistry::new();
        registry.update("orphan", downloading_patch(10.0, "a", "b"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("orphan").percent, 10.0);
    }

    #[test]
    fn test_percent_is_monotonic_while_downloading() {
        let registry = JobRegistry::new();
        registry.create("job-1");
        registry.update("job-1", downloading_patch(60.0, "a", "b"));
        registry.update("job-1", downloading_patch(5.0, "c", "d"));
        let snapshot = registry.get("job-1");
        assert_eq!(snapshot.percent, 60.0);
        // other fields still merge
        assert_eq!(snapshot.size, "c");
    }

    #[test]
    fn test_percent_clamped_to_valid_range() {
        let registry = JobRegistry::new();
        registry.create("job-1");
        registry.update(
            "job-1",
            ProgressPatch {
                percent: Some(250.0),
                ..ProgressPatch::default()
            },
        );
        assert_eq!(registry.get("job-1").percent, 100.0);
    }

    #[test]
    fn test_concurrent_reads_never_see_partial_updates() {
        let registry = Arc::new(JobRegistry::new());
        registry.create("job-1");

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    let tag = format!("step-{}", i);
                    registry.update(
                        "job-1",
                        downloading_patch(f64::from(i) / 10.0, &tag, &tag),
                    );
                }
            })
        };

        let reader = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let snapshot = registry.get("job-1");
                    // size and speed are written together; a torn read
                    // would let them diverge
                    if snapshot.size != "0 B" {
                        assert_eq!(snapshot.size, snapshot.speed);
                    }
                }
            })
        };

        writer.join().expect("writer thread");
        reader.join().expect("reader thread");
    }
}
