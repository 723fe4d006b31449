//! Per-task cancellation tokens.
//!
//! Each running task registers a `CancelToken`. Calling `cancel()` signals
//! the ReAct driver to stop at its next suspension point; the token can be
//! both polled (`is_cancelled`) and awaited (`cancelled`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A cancellation token checked (and awaited) by the runtime loop.
#[derive(Clone)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolve when cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the active cancellation token per task.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a task.
    pub fn register(&self, task_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(task_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running task. Returns true if a token was found.
    pub fn cancel(&self, task_id: &str) -> bool {
        if let Some(token) = self.tokens.lock().get(task_id) {
            token.cancel();
            return true;
        }
        false
    }

    /// Remove the token for a task (called when the run completes).
    pub fn remove(&self, task_id: &str) {
        self.tokens.lock().remove(task_id);
    }

    /// Check if a task has an active (running) token.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.tokens.lock().contains_key(task_id)
    }
}

pub type SharedCancelMap = Arc<CancelMap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let token = CancelToken::new();
        let clone = token.clone();
        let waiter = tokio::spawn(async move {
            clone.cancelled().await;
            true
        });
        token.cancel();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn map_register_cancel_remove() {
        let map = CancelMap::new();
        let token = map.register("t1");
        assert!(map.is_running("t1"));

        assert!(map.cancel("t1"));
        assert!(token.is_cancelled());

        map.remove("t1");
        assert!(!map.is_running("t1"));
        assert!(!map.cancel("t1"));
    }

    #[test]
    fn cancel_unknown_task_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("ghost"));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let old = map.register("t1");
        let new = map.register("t1");
        map.cancel("t1");
        assert!(new.is_cancelled());
        assert!(!old.is_cancelled());
    }
}
