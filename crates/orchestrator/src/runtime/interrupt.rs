//! Human-in-the-loop interrupt manager.
//!
//! The agent loop parks on [`InterruptManager::wait_for_response`] while a
//! user decides; the HTTP layer delivers the decision via
//! [`InterruptManager::submit_response`]. At most one interrupt is pending
//! per thread, and a response is delivered to at most one waiter.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use ha_domain::event::{InterruptKind, InterruptOption};
use ha_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A pending interrupt, also serialized to reconnecting clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub interrupt_id: String,
    pub thread_id: String,
    pub kind: InterruptKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<InterruptOption>>,
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: u64,
}

impl Interrupt {
    pub fn new(
        thread_id: impl Into<String>,
        kind: InterruptKind,
        title: impl Into<String>,
        message: impl Into<String>,
        options: Option<Vec<InterruptOption>>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            interrupt_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            options,
            created_at: Utc::now(),
            timeout_seconds,
        }
    }
}

/// What the user decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptAction {
    Approve,
    Deny,
    Skip,
    Select,
    Input,
    ApproveAlways,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptResponse {
    pub action: InterruptAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type WaiterKey = (String, String); // (thread_id, interrupt_id)

pub struct InterruptManager {
    /// One pending interrupt per thread.
    pending: Mutex<HashMap<String, Interrupt>>,
    /// Response channels for parked waiters.
    waiters: Mutex<HashMap<WaiterKey, oneshot::Sender<InterruptResponse>>>,
}

impl Default for InterruptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptManager {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Store an interrupt for a thread. A previous pending interrupt for
    /// the same thread is dropped (its waiter receives `Cancel`).
    pub fn create_interrupt(&self, interrupt: Interrupt) {
        let thread_id = interrupt.thread_id.clone();
        let previous = self.pending.lock().insert(thread_id.clone(), interrupt);
        if let Some(previous) = previous {
            tracing::warn!(
                thread_id = %thread_id,
                interrupt_id = %previous.interrupt_id,
                "replacing pending interrupt"
            );
            self.notify(
                &thread_id,
                &previous.interrupt_id,
                InterruptResponse {
                    action: InterruptAction::Cancel,
                    value: None,
                },
            );
        }
    }

    /// Block until a response arrives or the timeout elapses. The pending
    /// record is cleared either way.
    pub async fn wait_for_response(
        &self,
        thread_id: &str,
        interrupt_id: &str,
        timeout: Duration,
    ) -> Result<InterruptResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .insert((thread_id.to_owned(), interrupt_id.to_owned()), tx);

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.clear_pending(thread_id, interrupt_id);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped without a response (cancel path already
            // delivered, or manager shutdown).
            Ok(Err(_)) => Ok(InterruptResponse {
                action: InterruptAction::Cancel,
                value: None,
            }),
            Err(_) => {
                self.waiters
                    .lock()
                    .remove(&(thread_id.to_owned(), interrupt_id.to_owned()));
                Err(Error::Timeout(format!(
                    "interrupt {interrupt_id} timed out"
                )))
            }
        }
    }

    /// Deliver a user response. Returns false when no waiter is parked on
    /// the interrupt (it may have timed out or already been answered).
    pub fn submit_response(
        &self,
        thread_id: &str,
        interrupt_id: &str,
        action: InterruptAction,
        value: Option<String>,
    ) -> bool {
        self.notify(thread_id, interrupt_id, InterruptResponse { action, value })
    }

    /// The pending interrupt for a thread, for reconnection recovery.
    pub fn get_pending_interrupt(&self, thread_id: &str) -> Option<Interrupt> {
        self.pending.lock().get(thread_id).cloned()
    }

    /// Cancel a pending interrupt. The parked waiter (if any) receives a
    /// `Cancel` response. Returns true when something was cancelled.
    pub fn cancel_interrupt(&self, thread_id: &str, interrupt_id: &str) -> bool {
        let existed = self.clear_pending(thread_id, interrupt_id);
        let notified = self.notify(
            thread_id,
            interrupt_id,
            InterruptResponse {
                action: InterruptAction::Cancel,
                value: None,
            },
        );
        existed || notified
    }

    /// Drop every pending interrupt and waiter for a thread. Called on
    /// task cancellation so reconnecting clients see a clean slate.
    pub fn clear_thread(&self, thread_id: &str) {
        let removed = self.pending.lock().remove(thread_id);
        if let Some(interrupt) = removed {
            self.notify(
                thread_id,
                &interrupt.interrupt_id,
                InterruptResponse {
                    action: InterruptAction::Cancel,
                    value: None,
                },
            );
        }
        // Abandoned waiters (whose wait future was dropped) may have left
        // channel entries behind.
        self.waiters
            .lock()
            .retain(|(thread, _), _| thread != thread_id);
    }

    fn notify(&self, thread_id: &str, interrupt_id: &str, response: InterruptResponse) -> bool {
        let waiter = self
            .waiters
            .lock()
            .remove(&(thread_id.to_owned(), interrupt_id.to_owned()));
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Remove the pending record if it matches the interrupt id.
    fn clear_pending(&self, thread_id: &str, interrupt_id: &str) -> bool {
        let mut pending = self.pending.lock();
        if pending
            .get(thread_id)
            .map(|i| i.interrupt_id == interrupt_id)
            .unwrap_or(false)
        {
            pending.remove(thread_id);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_interrupt(thread_id: &str) -> Interrupt {
        Interrupt::new(
            thread_id,
            InterruptKind::Approval,
            "Code Execution",
            "Run print(1)?",
            None,
            300,
        )
    }

    #[tokio::test]
    async fn approve_flow() {
        let manager = Arc::new(InterruptManager::new());
        let interrupt = make_interrupt("th1");
        let interrupt_id = interrupt.interrupt_id.clone();
        manager.create_interrupt(interrupt);

        let waiter = {
            let manager = manager.clone();
            let interrupt_id = interrupt_id.clone();
            tokio::spawn(async move {
                manager
                    .wait_for_response("th1", &interrupt_id, Duration::from_secs(5))
                    .await
            })
        };

        // Give the waiter a tick to park.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(manager.submit_response("th1", &interrupt_id, InterruptAction::Approve, None));

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.action, InterruptAction::Approve);
        // Pending record cleared after delivery.
        assert!(manager.get_pending_interrupt("th1").is_none());
    }

    #[tokio::test]
    async fn timeout_clears_pending() {
        let manager = InterruptManager::new();
        let interrupt = make_interrupt("th1");
        let interrupt_id = interrupt.interrupt_id.clone();
        manager.create_interrupt(interrupt);

        let result = manager
            .wait_for_response("th1", &interrupt_id, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(manager.get_pending_interrupt("th1").is_none());
    }

    #[tokio::test]
    async fn submit_without_waiter_returns_false() {
        let manager = InterruptManager::new();
        assert!(!manager.submit_response("th1", "i1", InterruptAction::Approve, None));
    }

    #[tokio::test]
    async fn response_delivered_at_most_once() {
        let manager = Arc::new(InterruptManager::new());
        let interrupt = make_interrupt("th1");
        let interrupt_id = interrupt.interrupt_id.clone();
        manager.create_interrupt(interrupt);

        let waiter = {
            let manager = manager.clone();
            let interrupt_id = interrupt_id.clone();
            tokio::spawn(async move {
                manager
                    .wait_for_response("th1", &interrupt_id, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(manager.submit_response("th1", &interrupt_id, InterruptAction::Deny, None));
        // Second submission has no subscriber.
        assert!(!manager.submit_response("th1", &interrupt_id, InterruptAction::Approve, None));

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.action, InterruptAction::Deny);
    }

    #[tokio::test]
    async fn pending_interrupt_visible_until_answered() {
        let manager = InterruptManager::new();
        let interrupt = make_interrupt("th1");
        manager.create_interrupt(interrupt.clone());

        let pending = manager.get_pending_interrupt("th1").unwrap();
        assert_eq!(pending.interrupt_id, interrupt.interrupt_id);
        assert!(manager.get_pending_interrupt("other").is_none());
    }

    #[tokio::test]
    async fn cancel_delivers_cancel_action() {
        let manager = Arc::new(InterruptManager::new());
        let interrupt = make_interrupt("th1");
        let interrupt_id = interrupt.interrupt_id.clone();
        manager.create_interrupt(interrupt);

        let waiter = {
            let manager = manager.clone();
            let interrupt_id = interrupt_id.clone();
            tokio::spawn(async move {
                manager
                    .wait_for_response("th1", &interrupt_id, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(manager.cancel_interrupt("th1", &interrupt_id));
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.action, InterruptAction::Cancel);
    }

    #[tokio::test]
    async fn new_interrupt_replaces_previous_for_thread() {
        let manager = InterruptManager::new();
        let first = make_interrupt("th1");
        manager.create_interrupt(first);

        let second = make_interrupt("th1");
        let second_id = second.interrupt_id.clone();
        manager.create_interrupt(second);

        let pending = manager.get_pending_interrupt("th1").unwrap();
        assert_eq!(pending.interrupt_id, second_id);
    }

    #[tokio::test]
    async fn select_carries_value() {
        let manager = Arc::new(InterruptManager::new());
        let interrupt = make_interrupt("th1");
        let interrupt_id = interrupt.interrupt_id.clone();
        manager.create_interrupt(interrupt);

        let waiter = {
            let manager = manager.clone();
            let interrupt_id = interrupt_id.clone();
            tokio::spawn(async move {
                manager
                    .wait_for_response("th1", &interrupt_id, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.submit_response(
            "th1",
            &interrupt_id,
            InterruptAction::Select,
            Some("python".into()),
        );
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.action, InterruptAction::Select);
        assert_eq!(response.value.as_deref(), Some("python"));
    }
}
