//! Progress reporter — a worker's pinned publisher for one task channel.
//!
//! Stamps every event with the task id, a monotonically increasing ordinal,
//! and a wall-clock timestamp. Token events are batched (flushed every
//! [`TOKEN_BATCH_SIZE`] tokens) to cap publish volume: a flush holding a
//! single fragment goes out as a plain `token` event, several coalesced
//! fragments as one `token_batch`. Any non-token emit flushes the pending
//! buffer first so ordering against stages and tool events is preserved.
//! Publish failures are logged and never interrupt the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use ha_domain::event::{Event, EventEnvelope, StageStatus};

use crate::broker::EventBus;
use crate::progress_channel;

/// Tokens buffered before a `token_batch` event is published.
const TOKEN_BATCH_SIZE: usize = 10;

pub struct ProgressReporter {
    bus: Arc<dyn EventBus>,
    task_id: String,
    channel: String,
    seq: AtomicU64,
    token_buffer: Mutex<TokenBuffer>,
}

#[derive(Default)]
struct TokenBuffer {
    content: String,
    count: usize,
}

impl ProgressReporter {
    pub fn new(bus: Arc<dyn EventBus>, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        let channel = progress_channel(&task_id);
        Self {
            bus,
            task_id,
            channel,
            seq: AtomicU64::new(0),
            token_buffer: Mutex::new(TokenBuffer::default()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Publish one event, flushing buffered tokens first.
    pub async fn emit(&self, event: Event) {
        self.flush_tokens().await;
        self.publish(event).await;
    }

    /// Buffer a token; publishes a `token_batch` once the buffer fills.
    pub async fn emit_token(&self, content: &str) {
        let flush = {
            let mut buf = self.token_buffer.lock().await;
            buf.content.push_str(content);
            buf.count += 1;
            buf.count >= TOKEN_BATCH_SIZE
        };
        if flush {
            self.flush_tokens().await;
        }
    }

    /// Flush buffered tokens: one fragment publishes as `token`, several
    /// as one `token_batch` carrying the joined content.
    pub async fn flush_tokens(&self) {
        let (content, count) = {
            let mut buf = self.token_buffer.lock().await;
            if buf.count == 0 {
                return;
            }
            let count = buf.count;
            buf.count = 0;
            (std::mem::take(&mut buf.content), count)
        };
        if count == 1 {
            self.publish(Event::Token { content }).await;
        } else {
            self.publish(Event::TokenBatch { content }).await;
        }
    }

    async fn publish(&self, event: Event) {
        let envelope = EventEnvelope {
            event,
            task_id: self.task_id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(task_id = %self.task_id, error = %e, "event serialization failed");
                return;
            }
        };
        if let Err(e) = self.bus.publish(&self.channel, payload).await {
            tracing::warn!(task_id = %self.task_id, error = %e, "progress publish failed");
        }
    }

    // ── Convenience emitters ───────────────────────────────────────

    pub async fn emit_task_started(&self) {
        self.emit(Event::TaskStarted {
            task_id: self.task_id.clone(),
        })
        .await;
    }

    pub async fn emit_stage(&self, name: &str, description: &str, status: StageStatus) {
        self.emit(Event::Stage {
            name: name.into(),
            description: description.into(),
            status,
        })
        .await;
    }

    pub async fn emit_source(
        &self,
        title: &str,
        url: &str,
        snippet: Option<String>,
        relevance_score: Option<f64>,
    ) {
        self.emit(Event::Source {
            title: title.into(),
            url: url.into(),
            snippet,
            relevance_score,
        })
        .await;
    }

    pub async fn emit_progress(&self, percentage: u8, message: Option<String>) {
        self.emit(Event::Progress {
            percentage: percentage.min(100),
            message,
        })
        .await;
    }

    pub async fn emit_complete(&self) {
        self.emit(Event::Complete {}).await;
    }

    pub async fn emit_error(&self, message: &str, name: Option<String>) {
        self.emit(Event::Error {
            message: message.into(),
            name,
        })
        .await;
    }

    /// Flush and drop the channel state. Call after the terminal event.
    pub async fn close(&self) {
        self.flush_tokens().await;
        self.bus.cleanup_channel(&self.channel);
    }
}
