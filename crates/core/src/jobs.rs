//! Job durability — every turn is a persistent job that survives client
//! disconnects, crashes, and restarts within the retention window.
//!
//! Jobs are persisted to a JSONL file and kept in a bounded in-memory ring
//! for fast polling. Streaming consumers subscribe to a per-job broadcast
//! channel; the channel is advisory, the record is authoritative.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use alfred_domain::error::{Error, ErrorCode, Result};
use alfred_domain::event::TurnEvent;
use alfred_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub status: JobStatus,
    /// The turn request, verbatim.
    pub input: Value,
    /// The turn result; survives disconnect and restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Step progress, updated as the plan executes.
    #[serde(default)]
    pub steps_checkpoint: Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when a complete job is acknowledged; a timestamp, not a status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(user_id: &str, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            status: JobStatus::Pending,
            input,
            output: None,
            steps_checkpoint: Value::Null,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            acknowledged_at: None,
            error: None,
        }
    }

    /// One-way status transitions: pending → running → complete | failed.
    pub fn advance(&mut self, to: JobStatus) -> bool {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Complete)
                | (JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return false;
        }
        self.status = to;
        match to {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Complete | JobStatus::Failed => self.completed_at = Some(Utc::now()),
            JobStatus::Pending => {}
        }
        true
    }

    fn duration_ms(&self) -> u64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_JOBS_IN_MEMORY: usize = 2000;

pub struct JobStore {
    inner: RwLock<JobStoreInner>,
    log_path: PathBuf,
    event_channels: RwLock<HashMap<Uuid, broadcast::Sender<TurnEvent>>>,
}

struct JobStoreInner {
    jobs: VecDeque<Job>,
    index: HashMap<Uuid, usize>,
    /// Logical sequence number of the front element; keeps the index valid
    /// without bulk adjustment when old entries are popped.
    base_seq: usize,
}

impl JobStoreInner {
    fn new(jobs: VecDeque<Job>) -> Self {
        let mut index = HashMap::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            index.insert(job.id, i);
        }
        Self {
            jobs,
            index,
            base_seq: 0,
        }
    }

    fn get(&self, id: &Uuid) -> Option<&Job> {
        let seq = *self.index.get(id)?;
        self.jobs.get(seq - self.base_seq)
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut Job> {
        let seq = *self.index.get(id)?;
        let idx = seq - self.base_seq;
        self.jobs.get_mut(idx)
    }

    fn push_back(&mut self, job: Job) {
        let seq = self.base_seq + self.jobs.len();
        self.index.insert(job.id, seq);
        self.jobs.push_back(job);
    }

    fn pop_front(&mut self) -> Option<Job> {
        let job = self.jobs.pop_front()?;
        self.index.remove(&job.id);
        self.base_seq += 1;
        Some(job)
    }
}

impl JobStore {
    /// Create a store, reloading recent jobs from `state_path/jobs/jobs.jsonl`.
    pub fn new(state_path: &Path) -> Self {
        let dir = state_path.join("jobs");
        std::fs::create_dir_all(&dir).ok();
        let log_path = dir.join("jobs.jsonl");

        let (jobs, total_on_disk) = Self::load_recent(&log_path);
        if total_on_disk > jobs.len() {
            tracing::info!(
                kept = jobs.len(),
                pruned = total_on_disk - jobs.len(),
                "pruning jobs JSONL on disk"
            );
            Self::rewrite_jsonl(&log_path, &jobs);
        }

        Self {
            inner: RwLock::new(JobStoreInner::new(jobs)),
            log_path,
            event_channels: RwLock::new(HashMap::new()),
        }
    }

    /// Keep only the latest record per job id (the JSONL is append-only,
    /// so a job appears once per persisted transition).
    fn load_recent(path: &Path) -> (VecDeque<Job>, usize) {
        let mut total = 0;
        let mut latest: Vec<Job> = Vec::new();
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            total = lines.len();
            let mut seen: HashMap<Uuid, usize> = HashMap::new();
            for line in lines {
                let Ok(job) = serde_json::from_str::<Job>(line) else {
                    continue;
                };
                match seen.get(&job.id) {
                    Some(&i) => latest[i] = job,
                    None => {
                        seen.insert(job.id, latest.len());
                        latest.push(job);
                    }
                }
            }
        }
        let start = latest.len().saturating_sub(MAX_JOBS_IN_MEMORY);
        (latest.drain(start..).collect(), total)
    }

    fn rewrite_jsonl(path: &Path, jobs: &VecDeque<Job>) {
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for job in jobs {
                if let Ok(json) = serde_json::to_string(job) {
                    if writeln!(f, "{json}").is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    pub fn insert(&self, job: Job) -> Uuid {
        let id = job.id;
        let mut inner = self.inner.write();
        inner.push_back(job);
        if inner.jobs.len() > MAX_JOBS_IN_MEMORY {
            inner.pop_front();
        }
        id
    }

    /// Update a job in place. Returns true when found.
    pub fn update<F>(&self, id: &Uuid, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.write();
        if let Some(job) = inner.get_mut(id) {
            f(job);
            return true;
        }
        false
    }

    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.inner.read().get(id).cloned()
    }

    /// Append the job's current state to the JSONL log.
    pub fn persist(&self, job: &Job) {
        if let Ok(json) = serde_json::to_string(job) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
        if job.status.is_terminal() {
            TraceEvent::JobFinished {
                job_id: job.id.to_string(),
                status: format!("{:?}", job.status).to_lowercase(),
                duration_ms: job.duration_ms(),
            }
            .emit();
        }
    }

    /// Acknowledge a complete job. Fails for unknown, unfinished, or
    /// already-acknowledged jobs.
    pub fn ack(&self, id: &Uuid) -> Result<Job> {
        let mut inner = self.inner.write();
        let job = inner
            .get_mut(id)
            .ok_or_else(|| Error::tagged(ErrorCode::NotFound, format!("no job {id}")))?;
        if job.status != JobStatus::Complete {
            return Err(Error::validation(format!(
                "job {id} is not complete (status: {:?})",
                job.status
            )));
        }
        if job.acknowledged_at.is_some() {
            return Err(Error::validation(format!("job {id} already acknowledged")));
        }
        job.acknowledged_at = Some(Utc::now());
        let job = job.clone();
        drop(inner);
        self.persist(&job);
        Ok(job)
    }

    pub fn list_for_user(&self, user_id: &str, limit: usize) -> Vec<Job> {
        self.inner
            .read()
            .jobs
            .iter()
            .rev()
            .filter(|j| j.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop terminal jobs older than the retention window. Returns how
    /// many were pruned.
    pub fn prune_expired(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut inner = self.inner.write();
        let before = inner.jobs.len();
        let kept: VecDeque<Job> = inner
            .jobs
            .drain(..)
            .filter(|j| {
                !(j.status.is_terminal()
                    && j.completed_at.map(|t| t < cutoff).unwrap_or(false))
            })
            .collect();
        let pruned = before - kept.len();
        *inner = JobStoreInner::new(kept);
        if pruned > 0 {
            Self::rewrite_jsonl(&self.log_path, &inner.jobs);
        }
        pruned
    }

    // ── Event channels ────────────────────────────────────────────

    pub fn subscribe(&self, id: &Uuid) -> broadcast::Receiver<TurnEvent> {
        let mut channels = self.event_channels.write();
        channels
            .entry(*id)
            .or_insert_with(|| broadcast::channel(128).0)
            .subscribe()
    }

    pub fn emit(&self, id: &Uuid, event: TurnEvent) {
        let channels = self.event_channels.read();
        if let Some(tx) = channels.get(id) {
            let _ = tx.send(event);
        }
    }

    pub fn cleanup_channel(&self, id: &Uuid) {
        self.event_channels.write().remove(id);
    }
}
