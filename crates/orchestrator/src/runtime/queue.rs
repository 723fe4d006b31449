//! Durable task records and the background job queue.
//!
//! Tasks are the durable unit of work (JSONL log + bounded in-memory
//! ring); jobs are the queue entries workers poll. Job ids are
//! deterministic (`research:<task_id>`), so re-enqueueing the same work is
//! idempotent, while worker-driven retries reuse the id after incrementing
//! `retry_count`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Task,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub query: String,
    pub status: TaskStatus,
    /// 0..=100, non-decreasing.
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Task {
    pub fn new(
        kind: TaskKind,
        query: impl Into<String>,
        user_id: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            query: query.into(),
            status: TaskStatus::Pending,
            progress: 0,
            retry_count: 0,
            max_retries,
            worker_id: None,
            priority: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            user_id: user_id.into(),
            project_id: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task store (JSONL + bounded ring)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_TASKS_IN_MEMORY: usize = 2000;

pub struct TaskStore {
    inner: RwLock<TaskStoreInner>,
    log_path: PathBuf,
}

struct TaskStoreInner {
    tasks: VecDeque<Task>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl TaskStoreInner {
    fn new(tasks: VecDeque<Task>) -> Self {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            index.insert(task.id.clone(), i);
        }
        Self {
            tasks,
            index,
            base_seq: 0,
        }
    }

    fn get(&self, id: &str) -> Option<&Task> {
        let seq = *self.index.get(id)?;
        self.tasks.get(seq - self.base_seq)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        let seq = *self.index.get(id)?;
        let idx = seq - self.base_seq;
        self.tasks.get_mut(idx)
    }

    fn push_back(&mut self, task: Task) {
        let seq = self.base_seq + self.tasks.len();
        self.index.insert(task.id.clone(), seq);
        self.tasks.push_back(task);
    }

    fn pop_front(&mut self) {
        if let Some(task) = self.tasks.pop_front() {
            self.index.remove(&task.id);
            self.base_seq += 1;
        }
    }
}

impl TaskStore {
    pub fn new(state_path: &Path) -> Self {
        let dir = state_path.join("tasks");
        std::fs::create_dir_all(&dir).ok();
        let log_path = dir.join("tasks.jsonl");

        let mut tasks = VecDeque::new();
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            // The log is append-only; the last line for an id wins.
            let mut latest: HashMap<String, Task> = HashMap::new();
            let mut order: Vec<String> = Vec::new();
            for line in content.lines() {
                if let Ok(task) = serde_json::from_str::<Task>(line) {
                    if !latest.contains_key(&task.id) {
                        order.push(task.id.clone());
                    }
                    latest.insert(task.id.clone(), task);
                }
            }
            for id in order.into_iter().rev().take(MAX_TASKS_IN_MEMORY) {
                if let Some(task) = latest.remove(&id) {
                    tasks.push_front(task);
                }
            }
        }

        Self {
            inner: RwLock::new(TaskStoreInner::new(tasks)),
            log_path,
        }
    }

    pub fn insert(&self, task: Task) -> String {
        let id = task.id.clone();
        self.persist(&task);
        let mut inner = self.inner.write();
        inner.push_back(task);
        if inner.tasks.len() > MAX_TASKS_IN_MEMORY {
            inner.pop_front();
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().get(id).cloned()
    }

    /// Update a task in place. Returns true when found.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.inner.write();
        if let Some(task) = inner.get_mut(id) {
            f(task);
            return true;
        }
        false
    }

    /// Compare-and-swap status transition. Only the expected `from` status
    /// is replaced, so two workers cannot both claim a task.
    pub fn transition(&self, id: &str, from: TaskStatus, to: TaskStatus) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(id) {
            Some(task) if task.status == from => {
                task.status = to;
                if to == TaskStatus::Running && task.started_at.is_none() {
                    task.started_at = Some(Utc::now());
                }
                if to.is_terminal() {
                    task.completed_at = Some(Utc::now());
                }
                true
            }
            _ => false,
        }
    }

    /// Raise progress; lowering is ignored so progress stays monotonic.
    pub fn set_progress(&self, id: &str, progress: u8) {
        self.update(id, |task| {
            let clamped = progress.min(100);
            if clamped > task.progress {
                task.progress = clamped;
            }
        });
    }

    /// Cancel a non-terminal task. Returns false once terminal.
    pub fn cancel(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Append the task's current state to the JSONL log.
    pub fn persist_current(&self, id: &str) {
        if let Some(task) = self.get(id) {
            self.persist(&task);
        }
    }

    fn persist(&self, task: &Task) {
        if let Ok(json) = serde_json::to_string(task) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
    }

    /// List tasks with optional filters, newest first.
    pub fn list(
        &self,
        user_id: Option<&str>,
        status: Option<TaskStatus>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Task>, usize) {
        let inner = self.inner.read();
        let filter = |t: &&Task| -> bool {
            if let Some(user) = user_id {
                if t.user_id != user {
                    return false;
                }
            }
            if let Some(status) = status {
                if t.status != status {
                    return false;
                }
            }
            true
        };

        let total = inner.tasks.iter().rev().filter(filter).count();
        let page: Vec<Task> = inner
            .tasks
            .iter()
            .rev()
            .filter(filter)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, total)
    }

    /// Status counts for the queue stats endpoint.
    pub fn status_counts(&self) -> HashMap<String, usize> {
        let inner = self.inner.read();
        let mut counts = HashMap::new();
        for task in inner.tasks.iter() {
            let key = serde_json::to_value(task.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub task_id: String,
    pub kind: TaskKind,
    pub payload: Value,
    pub priority: i32,
    pub ready_at: Instant,
}

/// Deterministic job id for a task's main job.
pub fn research_job_id(task_id: &str) -> String {
    format!("research:{task_id}")
}

/// Deterministic job id for any task kind.
pub fn job_id_for(kind: TaskKind, task_id: &str) -> String {
    match kind {
        TaskKind::Research => research_job_id(task_id),
        TaskKind::Task => format!("task:{task_id}"),
    }
}

/// Deterministic job id for a generic batch operation: the suffix hashes
/// the payload, so identical batch submissions coalesce.
pub fn batch_job_id(task_type: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task_type.as_bytes());
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("batch:{task_type}:{}", &hex::encode(digest)[..8])
}

/// In-process broker-shaped queue: delayed entries, priority pop,
/// idempotent enqueue by job id.
pub struct JobQueue {
    pending: Mutex<Vec<Job>>,
    running: Mutex<HashSet<String>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Enqueue a job. A job id already pending or running is not enqueued
    /// again; the existing id is returned.
    pub fn enqueue(&self, job: Job) -> String {
        let job_id = job.job_id.clone();
        if self.running.lock().contains(&job_id) {
            tracing::debug!(job_id = %job_id, "duplicate enqueue ignored (running)");
            return job_id;
        }
        let mut pending = self.pending.lock();
        if pending.iter().any(|j| j.job_id == job_id) {
            tracing::debug!(job_id = %job_id, "duplicate enqueue ignored (pending)");
            return job_id;
        }
        pending.push(job);
        job_id
    }

    /// Pop the highest-priority ready job, marking it running.
    pub fn pop_ready(&self) -> Option<Job> {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let idx = pending
            .iter()
            .enumerate()
            .filter(|(_, j)| j.ready_at <= now)
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.ready_at.cmp(&a.ready_at))
            })
            .map(|(i, _)| i)?;
        let job = pending.remove(idx);
        self.running.lock().insert(job.job_id.clone());
        Some(job)
    }

    /// Re-enqueue a running job after a backoff delay (worker retry path).
    pub fn requeue_after(&self, mut job: Job, delay: Duration) {
        self.running.lock().remove(&job.job_id);
        job.ready_at = Instant::now() + delay;
        self.pending.lock().push(job);
    }

    /// Mark a running job finished.
    pub fn complete(&self, job_id: &str) {
        self.running.lock().remove(job_id);
    }

    /// Remove a pending job (task cancelled while queued).
    pub fn remove_pending(&self, job_id: &str) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|j| j.job_id != job_id);
        before != pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}
