//! Background worker — claims jobs, drives the supervisor, translates
//! events into task-row updates, and owns the retry/terminal bookkeeping.
//!
//! Invariants enforced here:
//! - a task row is owned by exactly one worker between `running` and a
//!   terminal state (CAS claim);
//! - the event stream for a task ends with exactly one `complete` or
//!   terminal `error`;
//! - retries keep the task id and increment `retry_count`, re-enqueueing
//!   the same job id with backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Semaphore;

use ha_bus::{EventBus, ProgressReporter};
use ha_domain::backoff::BackoffPolicy;
use ha_domain::config::Config;
use ha_domain::event::Event;
use ha_domain::{classify, Error};
use ha_providers::{AgentType, ProviderRegistry};
use ha_sandbox::SandboxManagerSet;

use super::agents::{ResearchDepth, ResearchScenario};
use super::cancel::{CancelMap, CancelToken};
use super::interrupt::InterruptManager;
use super::queue::{Job, JobQueue, TaskKind, TaskStatus, TaskStore};
use super::supervisor::{run_supervisor, SupervisorDeps, SupervisorInput};
use super::tools::pipeline::ToolPipeline;
use super::tools::ToolContext;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared worker context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WorkerContext {
    pub config: Arc<Config>,
    pub store: Arc<TaskStore>,
    pub queue: Arc<JobQueue>,
    pub bus: Arc<dyn EventBus>,
    pub cancel_map: Arc<CancelMap>,
    pub interrupts: Arc<InterruptManager>,
    pub sandboxes: Arc<SandboxManagerSet>,
    pub llm: Arc<ProviderRegistry>,
    pub pipeline: Arc<ToolPipeline>,
    /// Tool retry pacing, threaded through to the driver.
    pub retry: BackoffPolicy,
    pub worker_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job processing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process one claimed job to a terminal state or a retry re-enqueue.
pub async fn process_job(ctx: &WorkerContext, job: Job) {
    let task_id = job.task_id.clone();

    // ── Claim ─────────────────────────────────────────────────────
    if !ctx
        .store
        .transition(&task_id, TaskStatus::Pending, TaskStatus::Running)
    {
        tracing::info!(task_id = %task_id, "job skipped: task no longer pending");
        ctx.queue.complete(&job.job_id);
        return;
    }
    ctx.store.update(&task_id, |t| {
        t.worker_id = Some(ctx.worker_id.clone());
    });
    ctx.store.persist_current(&task_id);

    let Some(task) = ctx.store.get(&task_id) else {
        ctx.queue.complete(&job.job_id);
        return;
    };

    // ── Publisher + event → row mirror ────────────────────────────
    let reporter = Arc::new(ProgressReporter::new(ctx.bus.clone(), task_id.clone()));
    let mirror = spawn_progress_mirror(ctx, &task_id).await;

    let cancel = ctx.cancel_map.register(&task_id);
    reporter.emit_task_started().await;

    // ── Run the supervisor ────────────────────────────────────────
    let tool_ctx = ToolContext::new(task.user_id.clone(), task_id.clone(), reporter.clone());
    let deps = SupervisorDeps {
        config: ctx.config.clone(),
        llm: ctx.llm.clone(),
        pipeline: ctx.pipeline.clone(),
        cancel: cancel.clone(),
        retry: ctx.retry.clone(),
    };
    let input = SupervisorInput {
        query: task.query.clone(),
        mode: match task.kind {
            TaskKind::Research => Some(AgentType::Research),
            TaskKind::Task => None,
        },
        depth: job
            .payload
            .get("depth")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        scenario: job
            .payload
            .get("scenario")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        model: job
            .payload
            .get("model")
            .and_then(|v| v.as_str())
            .map(String::from),
    };

    let run = run_supervisor(&deps, &tool_ctx, input);
    let outcome = if task.kind == TaskKind::Research {
        let budget = Duration::from_secs(ctx.config.research.task_timeout_secs);
        match tokio::time::timeout(budget, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout(format!(
                "research task exceeded {}s",
                budget.as_secs()
            ))),
        }
    } else {
        run.await
    };

    // ── Finalize ──────────────────────────────────────────────────
    let mut requeued = false;
    match outcome {
        Ok(report) => {
            ctx.store.update(&task_id, |t| {
                if !t.status.is_terminal() {
                    t.result = Some(report.clone());
                }
            });
            if ctx
                .store
                .transition(&task_id, TaskStatus::Running, TaskStatus::Completed)
            {
                ctx.store.set_progress(&task_id, 100);
                reporter.emit_complete().await;
                tracing::info!(task_id = %task_id, "task completed");
            } else {
                // Cancelled from outside after the work finished.
                reporter.emit_error("cancelled", Some("cancelled".into())).await;
            }
        }
        Err(Error::Cancelled) => {
            ctx.store
                .transition(&task_id, TaskStatus::Running, TaskStatus::Cancelled);
            reporter.emit_error("cancelled", Some("cancelled".into())).await;
            tracing::info!(task_id = %task_id, "task cancelled");
        }
        Err(e) => {
            let category = classify(&e);
            let message = e.to_string();
            let current = ctx.store.get(&task_id);
            let retry_count = current.as_ref().map(|t| t.retry_count).unwrap_or(0);
            let max_retries = current.as_ref().map(|t| t.max_retries).unwrap_or(0);

            if category.is_retryable() && retry_count < max_retries {
                let next_retry = retry_count + 1;
                ctx.store.update(&task_id, |t| {
                    t.retry_count = next_retry;
                    t.worker_id = None;
                });
                // Back to pending; the same job id returns with backoff.
                if ctx
                    .store
                    .transition(&task_id, TaskStatus::Running, TaskStatus::Pending)
                {
                    let policy = BackoffPolicy {
                        base_delay: Duration::from_secs(ctx.config.queue.backoff_base_secs),
                        max_delay: Duration::from_secs(300),
                        max_retries,
                    };
                    let delay = policy.delay_for_attempt(retry_count);
                    tracing::warn!(
                        task_id = %task_id,
                        retry = next_retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient task failure, re-enqueueing"
                    );
                    ctx.queue.requeue_after(job.clone(), delay);
                    requeued = true;
                }
            }

            if !requeued {
                ctx.store.update(&task_id, |t| {
                    if !t.status.is_terminal() {
                        t.error = Some(message.clone());
                    }
                });
                ctx.store
                    .transition(&task_id, TaskStatus::Running, TaskStatus::Failed);
                reporter
                    .emit_error(&message, Some(category.as_str().into()))
                    .await;
                tracing::error!(task_id = %task_id, category = %category, error = %message, "task failed");
            }
        }
    }

    ctx.store.persist_current(&task_id);

    // ── Cleanup, regardless of outcome path ───────────────────────
    let task_user = ctx.store.get(&task_id).map(|t| t.user_id);
    ctx.sandboxes
        .cleanup_for_task(task_user.as_deref(), Some(&task_id))
        .await;
    ctx.interrupts.clear_thread(&task_id);
    ctx.cancel_map.remove(&task_id);
    if !requeued {
        ctx.queue.complete(&job.job_id);
        reporter.close().await;
    }
    mirror.abort();
}

/// Mirror progress events into the task row so reconnecting clients can
/// recover state from storage alone.
async fn spawn_progress_mirror(
    ctx: &WorkerContext,
    task_id: &str,
) -> tokio::task::JoinHandle<()> {
    let mut stream = ctx.bus.subscribe(&ha_bus::progress_channel(task_id)).await;
    let store = ctx.store.clone();
    let task_id = task_id.to_string();
    tokio::spawn(async move {
        while let Some(payload) = stream.next().await {
            if let Ok(envelope) = serde_json::from_str::<ha_domain::EventEnvelope>(&payload) {
                if let Event::Progress { percentage, .. } = envelope.event {
                    store.set_progress(&task_id, percentage);
                }
            }
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Worker {
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Poll the queue until shutdown, running up to `max_jobs` jobs
    /// concurrently, then drain within the grace period.
    pub async fn run(&self, shutdown: CancelToken) {
        let max_jobs = self.ctx.config.queue.max_jobs.max(1);
        let poll_delay = Duration::from_millis(self.ctx.config.queue.poll_delay_ms);
        let semaphore = Arc::new(Semaphore::new(max_jobs));
        let mut jobs = tokio::task::JoinSet::new();

        tracing::info!(
            worker_id = %self.ctx.worker_id,
            max_jobs,
            "worker started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Reap finished jobs eagerly.
            while jobs.try_join_next().is_some() {}

            match self.ctx.queue.pop_ready() {
                Some(job) => {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let ctx = self.ctx.clone();
                    jobs.spawn(async move {
                        process_job(&ctx, job).await;
                        drop(permit);
                    });
                }
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(poll_delay) => {}
                    }
                }
            }
        }

        // ── Drain ─────────────────────────────────────────────────
        let grace = Duration::from_secs(self.ctx.config.queue.shutdown_grace_secs);
        tracing::info!(
            worker_id = %self.ctx.worker_id,
            running = jobs.len(),
            grace_secs = grace.as_secs(),
            "worker draining"
        );
        let drain = async {
            while jobs.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(worker_id = %self.ctx.worker_id, "drain grace period elapsed, aborting jobs");
            jobs.abort_all();
        }
        tracing::info!(worker_id = %self.ctx.worker_id, "worker stopped");
    }
}
